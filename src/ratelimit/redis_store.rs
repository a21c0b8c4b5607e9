//! Redis-backed counter store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::ErrorKind;
use tracing::{debug, info, warn};

use super::script::CHECK_SCRIPT;
use super::store::{CounterStore, ScriptHandle};
use crate::error::Result;

/// Counter store running the check script inside Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `url` and verify the connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection_manager = ConnectionManager::new(client).await?;

        let mut conn = connection_manager.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;

        info!("Connected to Redis");
        Ok(Self { connection_manager })
    }

    pub fn from_connection_manager(connection_manager: ConnectionManager) -> Self {
        Self { connection_manager }
    }

    async fn eval(&self, key: &str, times: u64, window_ms: u64) -> Result<i64> {
        let mut conn = self.connection_manager.clone();
        let pttl = redis::cmd("EVAL")
            .arg(CHECK_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(times)
            .arg(window_ms)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(pttl)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn load_script(&self) -> Result<ScriptHandle> {
        let mut conn = self.connection_manager.clone();
        let sha = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(CHECK_SCRIPT)
            .query_async::<String>(&mut conn)
            .await?;

        debug!(sha = %sha, "Loaded rate limit script");
        Ok(ScriptHandle::new(sha))
    }

    async fn check(
        &self,
        script: &ScriptHandle,
        key: &str,
        times: u64,
        window_ms: u64,
    ) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let result = redis::cmd("EVALSHA")
            .arg(script.sha())
            .arg(1)
            .arg(key)
            .arg(times)
            .arg(window_ms)
            .query_async::<i64>(&mut conn)
            .await;

        let pttl = match result {
            Ok(pttl) => pttl,
            // The script cache is empty after a Redis restart or SCRIPT FLUSH.
            Err(e) if e.kind() == ErrorKind::NoScriptError => {
                warn!(sha = %script.sha(), "Rate limit script missing, evaluating inline");
                self.eval(key, times, window_ms).await?
            }
            Err(e) => return Err(e.into()),
        };

        Ok(wait_from_pttl(pttl, window_ms))
    }
}

/// `0` is an admit; the script clamps a denied key's PTTL to at least `1`.
/// A negative PTTL on a denied key means it has no expiry (-1) or vanished
/// between commands (-2). Report a full window rather than admitting.
fn wait_from_pttl(pttl: i64, window_ms: u64) -> u64 {
    if pttl < 0 {
        warn!(pttl = pttl, "Rate limit counter without expiry");
        window_ms
    } else {
        pttl as u64
    }
}
