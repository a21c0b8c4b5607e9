//! HTTP server hosting the rate-limited API.

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::Result;
use crate::ratelimit::{enforce_rate_limit, RateLimit, RateLimitState, RouteLimits};

pub const SAMPLE_ROUTE: &str = "/api/v1/sample/";
pub const SIMPLE_ROUTE: &str = "/api/v1/simple/";
pub const HEALTH_ROUTE: &str = "/health";

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

async fn sample_endpoint() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("This is a sample endpoint with number: {}", 42),
    })
}

async fn simple_endpoint() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("This is a simple endpoint with number: {}", 42),
    })
}

async fn health() -> &'static str {
    "ok"
}

/// Built-in limits for the bundled endpoints.
pub fn default_routes() -> RouteLimits {
    RouteLimits::new()
        .with_route(SAMPLE_ROUTE, RateLimit::new(5).seconds(10))
        .with_route(SIMPLE_ROUTE, RateLimit::new(10).minutes(1))
}

/// Build the application router. Health checks are never rate limited.
pub fn router(state: RateLimitState) -> Router {
    let api = Router::new()
        .route(SAMPLE_ROUTE, get(sample_endpoint))
        .route(SIMPLE_ROUTE, get(simple_endpoint))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            enforce_rate_limit,
        ));

    Router::new()
        .route(HEALTH_ROUTE, get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for the API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    state: RateLimitState,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, state: RateLimitState) -> Self {
        Self { addr, state }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Starting HTTP server");

        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}
