//! axum middleware enforcing per-route rate limits.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, warn};

use super::callback::Verdict;
use super::limiter::RateLimiter;
use super::request::GateRequest;
use super::routes::RouteLimits;
use crate::error::RouteGateError;

/// Shared state for [`enforce_rate_limit`].
#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub routes: Arc<RouteLimits>,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>, routes: Arc<RouteLimits>) -> Self {
        Self { limiter, routes }
    }
}

/// Gate each request on the rule registered for its route.
///
/// Install with `Router::route_layer` so the matched route is known:
///
/// ```ignore
/// router.route_layer(axum::middleware::from_fn_with_state(state, enforce_rate_limit))
/// ```
///
/// Routes without a rule, or with a rule that never limits, pass untouched.
pub async fn enforce_rate_limit(
    State(state): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RouteGateError> {
    let gate_request = GateRequest::from_request(&req);

    let Some(rule) = state.routes.get(&gate_request.route_id) else {
        return Ok(next.run(req).await);
    };
    if !rule.is_enabled() {
        warn!(route = %gate_request.route_id, "Skipping invalid rate limit rule");
        return Ok(next.run(req).await);
    }

    match state.limiter.apply(&gate_request, &rule).await? {
        Verdict::Proceed => Ok(next.run(req).await),
        Verdict::Reject(rejection) => {
            debug!(
                route = %gate_request.route_id,
                retry_after = ?rejection.retry_after_secs,
                "Request rejected by rate limiter"
            );
            Ok(rejection.into_response())
        }
    }
}
