//! Shared counter store abstraction.

use async_trait::async_trait;

use crate::error::Result;

/// Handle to the check script once it is registered with a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHandle {
    sha: String,
}

impl ScriptHandle {
    pub fn new(sha: impl Into<String>) -> Self {
        Self { sha: sha.into() }
    }

    /// SHA1 digest the store knows the script by.
    pub fn sha(&self) -> &str {
        &self.sha
    }
}

/// A store holding expiring counters shared by every service instance.
///
/// Implementations must run [`CounterStore::check`] atomically per key: the
/// read of the current count and the write that follows cannot interleave
/// with another caller on the same key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Register the check script and return a handle for later calls.
    async fn load_script(&self) -> Result<ScriptHandle>;

    /// Count one request against `key`.
    ///
    /// Starts a fresh window of `window_ms` when the key has no live counter.
    /// Returns `0` when the request is admitted, otherwise the milliseconds
    /// left before the window expires.
    async fn check(
        &self,
        script: &ScriptHandle,
        key: &str,
        times: u64,
        window_ms: u64,
    ) -> Result<u64>;
}
