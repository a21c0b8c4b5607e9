//! In-process counter store.
//!
//! Suitable for a single instance and for tests. Each check runs while
//! holding the map entry for its key, which serializes callers per key the
//! same way Redis serializes script runs.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use super::script::CHECK_SCRIPT;
use super::store::{CounterStore, ScriptHandle};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Instant,
}

impl Counter {
    fn is_live(&self, now: Instant) -> bool {
        self.count > 0 && self.expires_at > now
    }
}

/// Expiring counters kept in a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: DashMap<String, Counter>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for `key`, or `None` once the window has expired.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.counters
            .get(key)
            .filter(|c| c.is_live(now))
            .map(|c| c.count)
    }

    /// Milliseconds left in the window for `key`.
    pub fn ttl_ms(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.counters
            .get(key)
            .filter(|c| c.is_live(now))
            .map(|c| remaining_ms(c.expires_at, now))
    }

    /// Drop expired counters. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, c| c.is_live(now));
        before - self.counters.len()
    }

    /// Number of counters held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn check_now(&self, key: &str, times: u64, window_ms: u64) -> u64 {
        let now = Instant::now();
        let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            expires_at: now,
        });

        if !entry.is_live(now) {
            *entry = Counter {
                count: 1,
                expires_at: now + Duration::from_millis(window_ms),
            };
            return 0;
        }

        if entry.count + 1 > times {
            return remaining_ms(entry.expires_at, now);
        }

        entry.count += 1;
        0
    }
}

/// Rounded up so a live window never reports zero.
fn remaining_ms(expires_at: Instant, now: Instant) -> u64 {
    let left = expires_at.saturating_duration_since(now);
    let ms = left.as_millis() as u64;
    if left > Duration::from_millis(ms) {
        ms + 1
    } else {
        ms.max(1)
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn load_script(&self) -> Result<ScriptHandle> {
        let sha = redis::Script::new(CHECK_SCRIPT).get_hash().to_string();
        Ok(ScriptHandle::new(sha))
    }

    async fn check(
        &self,
        _script: &ScriptHandle,
        key: &str,
        times: u64,
        window_ms: u64,
    ) -> Result<u64> {
        let wait = self.check_now(key, times, window_ms);
        trace!(key = %key, wait_ms = wait, "Checked in-memory counter");
        Ok(wait)
    }
}
