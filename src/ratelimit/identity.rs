//! Caller identification strategies.

use async_trait::async_trait;
use tracing::debug;

use super::request::GateRequest;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Maps a request to the identity component of its counter key.
#[async_trait]
pub trait Identifier: Send + Sync {
    async fn identify(&self, request: &GateRequest) -> String;
}

/// Identifies callers by client IP and request path: `"{ip}:{path}"`.
///
/// The IP is the first entry of `X-Forwarded-For` when the header is set,
/// otherwise the peer address, otherwise empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIdentifier;

impl DefaultIdentifier {
    fn client_ip(request: &GateRequest) -> String {
        let forwarded = request
            .header(FORWARDED_FOR)
            .and_then(|f| f.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        match forwarded {
            Some(ip) => ip.to_string(),
            None => request
                .peer_addr
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Identifier for DefaultIdentifier {
    async fn identify(&self, request: &GateRequest) -> String {
        let identity = format!("{}:{}", Self::client_ip(request), request.path);
        debug!(identity = %identity, "Rate limit identifier");
        identity
    }
}

#[async_trait]
impl<F> Identifier for F
where
    F: Fn(&GateRequest) -> String + Send + Sync,
{
    async fn identify(&self, request: &GateRequest) -> String {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static(value));
        headers
    }

    #[tokio::test]
    async fn test_forwarded_for_takes_first_address() {
        let request = GateRequest::new("/foo", "/foo")
            .with_headers(forwarded("1.2.3.4, 5.6.7.8"))
            .with_peer_addr("9.9.9.9:1234".parse().unwrap());

        assert_eq!(DefaultIdentifier.identify(&request).await, "1.2.3.4:/foo");
    }

    #[tokio::test]
    async fn test_falls_back_to_peer_address() {
        let request =
            GateRequest::new("/foo", "/foo").with_peer_addr("9.9.9.9:1234".parse().unwrap());

        assert_eq!(DefaultIdentifier.identify(&request).await, "9.9.9.9:/foo");
    }

    #[tokio::test]
    async fn test_empty_forwarded_for_falls_back_to_peer() {
        let request = GateRequest::new("/foo", "/foo")
            .with_headers(forwarded(""))
            .with_peer_addr("9.9.9.9:1234".parse().unwrap());

        assert_eq!(DefaultIdentifier.identify(&request).await, "9.9.9.9:/foo");
    }

    #[tokio::test]
    async fn test_blank_first_forwarded_entry_falls_back_to_peer() {
        let request = GateRequest::new("/foo", "/foo")
            .with_headers(forwarded(" , 5.6.7.8"))
            .with_peer_addr("9.9.9.9:1234".parse().unwrap());

        assert_eq!(DefaultIdentifier.identify(&request).await, "9.9.9.9:/foo");
    }

    #[tokio::test]
    async fn test_no_address_gives_empty_ip() {
        let request = GateRequest::new("/foo", "/foo");
        assert_eq!(DefaultIdentifier.identify(&request).await, ":/foo");
    }

    #[tokio::test]
    async fn test_closure_identifier() {
        let by_api_key = |request: &GateRequest| {
            request.header("x-api-key").unwrap_or("anonymous").to_string()
        };
        let request = GateRequest::new("/foo", "/foo");

        assert_eq!(by_api_key.identify(&request).await, "anonymous");
    }
}
