//! The view of an inbound request the limiter works with.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, MatchedPath};
use axum::http::{HeaderMap, Request};

/// Request data needed to identify a caller and the route it hit.
#[derive(Debug, Clone, Default)]
pub struct GateRequest {
    pub headers: HeaderMap,
    /// Transport-level peer address, when the server records it
    pub peer_addr: Option<SocketAddr>,
    pub path: String,
    /// Stable identifier of the matched route
    pub route_id: String,
}

impl GateRequest {
    pub fn new(path: impl Into<String>, route_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            route_id: route_id.into(),
            ..Self::default()
        }
    }

    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Build from an axum request.
    ///
    /// The route id is the matched path template (e.g. `/users/{id}`), which
    /// is the same for every request to the route. Requests that never went
    /// through the router fall back to their raw path.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let path = req.uri().path().to_string();
        let route_id = req
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string())
            .unwrap_or_else(|| path.clone());
        let peer_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            headers: req.headers().clone(),
            peer_addr,
            path,
            route_id,
        }
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
