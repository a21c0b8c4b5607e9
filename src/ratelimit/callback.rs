//! What happens when a caller is over its quota.

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::request::GateRequest;

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Let the request through
    Proceed,
    /// Short-circuit with the given rejection
    Reject(Rejection),
}

impl Verdict {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Verdict::Proceed)
    }
}

/// Invoked with the remaining window time when a caller is over budget.
///
/// Returning [`Verdict::Proceed`] lets the request through even though the
/// quota is exhausted; the request is not counted.
#[async_trait]
pub trait LimitCallback: Send + Sync {
    async fn on_limit(&self, request: &GateRequest, wait_ms: u64) -> Verdict;
}

/// Rejects with `429 Too Many Requests` and a `Retry-After` hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCallback;

#[async_trait]
impl LimitCallback for DefaultCallback {
    async fn on_limit(&self, _request: &GateRequest, wait_ms: u64) -> Verdict {
        Verdict::Reject(Rejection::too_many_requests(retry_after_secs(wait_ms)))
    }
}

/// Lets over-limit requests through, logging each one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl LimitCallback for PassThrough {
    async fn on_limit(&self, request: &GateRequest, wait_ms: u64) -> Verdict {
        warn!(
            route = %request.route_id,
            path = %request.path,
            wait_ms = wait_ms,
            "Rate limit exceeded, passing request through"
        );
        Verdict::Proceed
    }
}

#[async_trait]
impl<F> LimitCallback for F
where
    F: Fn(&GateRequest, u64) -> Verdict + Send + Sync,
{
    async fn on_limit(&self, request: &GateRequest, wait_ms: u64) -> Verdict {
        self(request, wait_ms)
    }
}

/// Whole seconds a client should wait, rounded up.
pub fn retry_after_secs(wait_ms: u64) -> u64 {
    wait_ms.div_ceil(1000)
}

/// A rejected request, rendered as an HTTP error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub detail: String,
    /// Value of the `Retry-After` header, in seconds
    pub retry_after_secs: Option<u64>,
}

impl Rejection {
    pub fn too_many_requests(retry_after_secs: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            detail: "Rate limit exceeded.".to_string(),
            retry_after_secs: Some(retry_after_secs),
        }
    }
}

/// Standard JSON error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status_code: u16,
    pub detail: String,
    pub extra: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let kind = if self.status == StatusCode::TOO_MANY_REQUESTS {
            "TooManyRequestsException"
        } else {
            "HTTPException"
        };
        let body = ErrorBody {
            status_code: self.status.as_u16(),
            detail: self.detail,
            extra: None,
            kind: kind.to_string(),
        };

        let mut response = (self.status, axum::Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
