//! Core rate limiter implementation.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use super::callback::{DefaultCallback, LimitCallback, Verdict};
use super::identity::{DefaultIdentifier, Identifier};
use super::request::GateRequest;
use super::rule::RateLimit;
use super::store::{CounterStore, ScriptHandle};
use crate::error::{Result, RouteGateError};

/// Admission control per (identity, route) pair over a fixed window.
///
/// Counters live in a [`CounterStore`] shared by every instance of the
/// service, so all instances draw from one quota. The limiter itself only
/// holds immutable configuration and can be shared across tasks.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    prefix: String,
    script: ScriptHandle,
    identifier: Arc<dyn Identifier>,
    callback: Arc<dyn LimitCallback>,
}

impl RateLimiter {
    /// Register the check script with `store` and build a limiter.
    ///
    /// Fails when `prefix` is empty or when the store cannot be reached.
    pub async fn setup(
        store: Arc<dyn CounterStore>,
        prefix: impl Into<String>,
        identifier: Option<Arc<dyn Identifier>>,
        callback: Option<Arc<dyn LimitCallback>>,
    ) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(RouteGateError::Config(
                "rate limiter prefix must not be empty".to_string(),
            ));
        }

        let script = store.load_script().await?;
        debug!(prefix = %prefix, sha = %script.sha(), "Rate limiter initialized");

        Ok(Self {
            store,
            prefix,
            script,
            identifier: identifier.unwrap_or_else(|| Arc::new(DefaultIdentifier)),
            callback: callback.unwrap_or_else(|| Arc::new(DefaultCallback)),
        })
    }

    /// Count `request` against its quota of `times` per `window_ms`.
    ///
    /// Returns [`Verdict::Proceed`] when the request is admitted. When it is
    /// over the limit the callback decides; the default rejects with a retry
    /// hint. Store failures are returned as errors.
    pub async fn hit(
        &self,
        request: &GateRequest,
        times: u64,
        window_ms: u64,
        identifier: Option<&dyn Identifier>,
        callback: Option<&dyn LimitCallback>,
    ) -> Result<Verdict> {
        let identifier = identifier.unwrap_or(self.identifier.as_ref());
        let callback = callback.unwrap_or(self.callback.as_ref());

        let identity = identifier.identify(request).await;
        let key = self.key(&identity, &request.route_id);

        trace!(key = %key, times = times, window_ms = window_ms, "Checking rate limit");

        let wait_ms = self.store.check(&self.script, &key, times, window_ms).await?;
        if wait_ms == 0 {
            return Ok(Verdict::Proceed);
        }

        debug!(key = %key, wait_ms = wait_ms, "Rate limit exceeded");
        Ok(callback.on_limit(request, wait_ms).await)
    }

    /// Count `request` against `rule`, honoring the rule's overrides.
    pub async fn apply(&self, request: &GateRequest, rule: &RateLimit) -> Result<Verdict> {
        self.hit(
            request,
            rule.times,
            rule.total_ms(),
            rule.identifier.as_deref(),
            rule.callback.as_deref(),
        )
        .await
    }

    /// Counter key for an identity on a route.
    pub fn key(&self, identity: &str, route_id: &str) -> String {
        format!("{}:{}:{}", self.prefix, identity, route_id)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("prefix", &self.prefix)
            .field("script", &self.script)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::callback::{retry_after_secs, PassThrough, Rejection};
    use crate::ratelimit::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const PEER: &str = "10.0.0.1:5000";

    async fn create_test_limiter() -> (Arc<MemoryStore>, RateLimiter) {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::setup(store.clone(), "rate_limiter", None, None)
            .await
            .unwrap();
        (store, limiter)
    }

    fn create_test_request(path: &str) -> GateRequest {
        GateRequest::new(path, path).with_peer_addr(PEER.parse().unwrap())
    }

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn load_script(&self) -> Result<ScriptHandle> {
            Ok(ScriptHandle::new("deadbeef"))
        }

        async fn check(&self, _: &ScriptHandle, _: &str, _: u64, _: u64) -> Result<u64> {
            Err(RouteGateError::Store(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))))
        }
    }

    #[tokio::test]
    async fn test_setup_rejects_empty_prefix() {
        let store = Arc::new(MemoryStore::new());
        let result = RateLimiter::setup(store, "", None, None).await;
        assert!(matches!(result, Err(RouteGateError::Config(_))));
    }

    #[tokio::test]
    async fn test_key_format() {
        let (_, limiter) = create_test_limiter().await;
        assert_eq!(limiter.key("1.2.3.4:/foo", "/foo"), "rate_limiter:1.2.3.4:/foo:/foo");
        assert_eq!(limiter.prefix(), "rate_limiter");
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_quota() {
        let (store, limiter) = create_test_limiter().await;
        let request = create_test_request("/foo");
        let key = limiter.key("10.0.0.1:/foo", "/foo");

        for n in 1..=5 {
            let verdict = limiter.hit(&request, 5, 10_000, None, None).await.unwrap();
            assert_eq!(verdict, Verdict::Proceed);
            assert_eq!(store.count(&key), Some(n));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_over_quota_with_wait_hint() {
        let (store, limiter) = create_test_limiter().await;
        let request = create_test_request("/foo");

        for _ in 0..3 {
            assert_ok!(limiter.hit(&request, 3, 2_500, None, None).await);
        }

        let verdict = limiter.hit(&request, 3, 2_500, None, None).await.unwrap();
        assert_eq!(verdict, Verdict::Reject(Rejection::too_many_requests(3)));

        let key = limiter.key("10.0.0.1:/foo", "/foo");
        assert_eq!(store.count(&key), Some(3));
        let ttl = store.ttl_ms(&key).unwrap();
        assert!(ttl > 0 && ttl <= 2_500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_resets_count() {
        let (store, limiter) = create_test_limiter().await;
        let request = create_test_request("/foo");
        let key = limiter.key("10.0.0.1:/foo", "/foo");

        limiter.hit(&request, 1, 1_000, None, None).await.unwrap();
        let verdict = limiter.hit(&request, 1, 1_000, None, None).await.unwrap();
        assert!(!verdict.is_proceed());

        tokio::time::advance(Duration::from_millis(1_000)).await;

        let verdict = limiter.hit(&request, 1, 1_000, None, None).await.unwrap();
        assert_eq!(verdict, Verdict::Proceed);
        assert_eq!(store.count(&key), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_do_not_interfere() {
        let (_, limiter) = create_test_limiter().await;
        let foo = create_test_request("/foo");
        let bar = create_test_request("/bar");
        let other_caller =
            GateRequest::new("/foo", "/foo").with_peer_addr("10.0.0.2:5000".parse().unwrap());

        limiter.hit(&foo, 1, 60_000, None, None).await.unwrap();
        assert!(!limiter.hit(&foo, 1, 60_000, None, None).await.unwrap().is_proceed());

        assert!(limiter.hit(&bar, 1, 60_000, None, None).await.unwrap().is_proceed());
        assert!(limiter
            .hit(&other_caller, 1, 60_000, None, None)
            .await
            .unwrap()
            .is_proceed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_identity_different_route() {
        let (_, limiter) = create_test_limiter().await;
        let fixed = |_: &GateRequest| "client".to_string();
        let first = GateRequest::new("/a", "route-a");
        let second = GateRequest::new("/a", "route-b");

        limiter.hit(&first, 1, 60_000, Some(&fixed), None).await.unwrap();
        assert!(limiter
            .hit(&second, 1, 60_000, Some(&fixed), None)
            .await
            .unwrap()
            .is_proceed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_hits_admit_exactly_quota() {
        let (store, limiter) = create_test_limiter().await;
        let limiter = Arc::new(limiter);
        let times = 10;
        let extra = 7;

        let handles: Vec<_> = (0..times + extra)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    let request = create_test_request("/burst");
                    limiter.hit(&request, times, 60_000, None, None).await.unwrap()
                })
            })
            .collect();

        let verdicts: Vec<Verdict> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let admitted = verdicts.iter().filter(|v| v.is_proceed()).count() as u64;
        assert_eq!(admitted, times);
        assert_eq!(verdicts.len() as u64 - admitted, extra);
        assert_eq!(store.count(&limiter.key("10.0.0.1:/burst", "/burst")), Some(times));
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_override_can_pass_through() {
        let (_, limiter) = create_test_limiter().await;
        let request = create_test_request("/soft");

        limiter.hit(&request, 1, 1_000, None, None).await.unwrap();
        let verdict = limiter
            .hit(&request, 1, 1_000, None, Some(&PassThrough))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Proceed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_receives_remaining_window() {
        let (_, limiter) = create_test_limiter().await;
        let request = create_test_request("/wait");
        let seen_wait = Arc::new(AtomicU64::new(0));
        let record_wait = {
            let seen_wait = seen_wait.clone();
            move |_: &GateRequest, wait_ms: u64| {
                seen_wait.store(wait_ms, Ordering::SeqCst);
                Verdict::Reject(Rejection::too_many_requests(retry_after_secs(wait_ms)))
            }
        };

        limiter.hit(&request, 1, 5_000, None, None).await.unwrap();
        tokio::time::advance(Duration::from_millis(1_200)).await;

        let verdict = limiter
            .hit(&request, 1, 5_000, None, Some(&record_wait))
            .await
            .unwrap();
        assert_eq!(seen_wait.load(Ordering::SeqCst), 3_800);
        assert_eq!(verdict, Verdict::Reject(Rejection::too_many_requests(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_uses_rule_overrides() {
        let (_, limiter) = create_test_limiter().await;
        let rule = RateLimit::new(2)
            .seconds(1)
            .with_identifier(Arc::new(|_: &GateRequest| "shared".to_string()))
            .with_callback(Arc::new(PassThrough));

        let first = GateRequest::new("/x", "/x").with_peer_addr("1.1.1.1:1".parse().unwrap());
        let second = GateRequest::new("/x", "/x").with_peer_addr("2.2.2.2:2".parse().unwrap());

        assert!(limiter.apply(&first, &rule).await.unwrap().is_proceed());
        assert!(limiter.apply(&second, &rule).await.unwrap().is_proceed());
        // Third request is over the shared quota but the callback lets it by.
        assert!(limiter.apply(&first, &rule).await.unwrap().is_proceed());

        let strict = RateLimit::new(2)
            .seconds(1)
            .with_identifier(Arc::new(|_: &GateRequest| "shared".to_string()));
        assert!(!limiter.apply(&first, &strict).await.unwrap().is_proceed());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let limiter = RateLimiter::setup(Arc::new(FailingStore), "rl", None, None)
            .await
            .unwrap();
        let request = create_test_request("/foo");

        let result = limiter.hit(&request, 1, 1_000, None, None).await;
        assert_err!(&result);
        assert!(matches!(result, Err(RouteGateError::Store(_))));
    }
}
