//! Host-based reverse proxy.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::response::{Html, IntoResponse, Response};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use labbox_shared::constants::gateway::{
    DIAL_TIMEOUT_SECS, KEEP_ALIVE_SECS, MAX_REQUEST_BODY_BYTES, TLS_HANDSHAKE_TIMEOUT_SECS,
};
use labbox_shared::errors::{LabboxError, LabboxResult};

use super::router::{App, RouteResolver};

const NOT_FOUND_PAGE: &str = include_str!("not_found.html");

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Leftmost label of a request host, with any port stripped.
///
/// Returns `None` when the host has fewer than two dot-separated labels.
///
/// ```
/// use labbox::gateway::host_label;
///
/// assert_eq!(host_label("ab12cd34.ctf.example.com:8443"), Some("ab12cd34"));
/// assert_eq!(host_label("localhost:8080"), None);
/// ```
pub fn host_label(host: &str) -> Option<&str> {
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    };
    let mut labels = host.split('.');
    let first = labels.next()?;
    labels.next()?;
    Some(first)
}

/// Forwards `<label>.<domain>` requests to the app registered for `label`.
#[derive(Clone)]
pub struct GatewayProxy {
    resolver: Arc<dyn RouteResolver>,
    client: reqwest::Client,
}

impl GatewayProxy {
    /// Build a proxy over `resolver`.
    ///
    /// Upstream TLS certificates are not verified. The connect timeout covers
    /// both the dial and the TLS handshake.
    pub fn new(resolver: Arc<dyn RouteResolver>) -> LabboxResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(Duration::from_secs(
                DIAL_TIMEOUT_SECS + TLS_HANDSHAKE_TIMEOUT_SECS,
            ))
            .tcp_keepalive(Duration::from_secs(KEEP_ALIVE_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| LabboxError::Internal(format!("gateway client: {e}")))?;
        Ok(Self { resolver, client })
    }

    /// Handle one inbound request.
    pub async fn handle(&self, req: Request, remote: Option<SocketAddr>) -> Response {
        let host = request_host(&req);
        let Some(label) = host.as_deref().and_then(host_label) else {
            return (StatusCode::BAD_REQUEST, "bad request").into_response();
        };
        let Some(app) = self.resolver.resolve(label) else {
            return (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response();
        };

        let method = req.method().clone();
        let uri = req.uri().clone();
        let start = Instant::now();

        let response = self.forward(&app, req, remote).await;

        tracing::debug!(
            method = %method,
            uri = %uri,
            remote = ?remote,
            status = response.status().as_u16(),
            latency = ?start.elapsed(),
            "Proxied request"
        );
        response
    }

    async fn forward(&self, app: &App, req: Request, remote: Option<SocketAddr>) -> Response {
        let (parts, body) = req.into_parts();
        let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected request body");
                return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
            }
        };

        let path = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", app.base_url(), path);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);
        if let Some(remote) = remote {
            append_forwarded_for(&mut headers, remote);
        }

        let upstream = match self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
        {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(upstream = %app.host, error = %e, "Upstream request failed");
                return (StatusCode::BAD_GATEWAY, "bad gateway").into_response();
            }
        };

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl std::fmt::Debug for GatewayProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayProxy").finish_non_exhaustive()
    }
}

/// Axum router sending every request through `proxy`.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// proxy can set `X-Forwarded-For`.
pub fn gateway_router(proxy: GatewayProxy) -> Router {
    Router::new().fallback(proxy_handler).with_state(proxy)
}

async fn proxy_handler(State(proxy): State<GatewayProxy>, req: Request) -> Response {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    proxy.handle(req, remote).await
}

fn request_host(req: &Request) -> Option<String> {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.as_str().to_string()))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers listed in `Connection` are connection-scoped too.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, remote: SocketAddr) {
    let ip = remote.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SubdomainRouter;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn test_host_label() {
        assert_eq!(host_label("abc.example.com"), Some("abc"));
        assert_eq!(host_label("abc.example.com:443"), Some("abc"));
        assert_eq!(host_label("abc.localhost"), Some("abc"));
        assert_eq!(host_label("localhost"), None);
        assert_eq!(host_label("localhost:8080"), None);
        assert_eq!(host_label(""), None);
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, x-custom"));
        headers.insert("x-custom", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::ACCEPT));
    }

    #[test]
    fn test_forwarded_for_appends() {
        let mut headers = HeaderMap::new();
        let remote: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        append_forwarded_for(&mut headers, remote);
        assert_eq!(headers[&X_FORWARDED_FOR], "10.1.2.3");

        append_forwarded_for(&mut headers, "10.9.9.9:1".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "10.1.2.3, 10.9.9.9");
    }

    fn proxy() -> (SubdomainRouter, Router) {
        let routes = SubdomainRouter::new();
        let proxy = GatewayProxy::new(Arc::new(routes.clone())).unwrap();
        (routes, gateway_router(proxy))
    }

    #[tokio::test]
    async fn test_single_label_host_is_bad_request() {
        let (_, app) = proxy();
        let req = http::Request::builder()
            .uri("/")
            .header(header::HOST, "localhost:8080")
            .body(Body::empty())
            .unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"bad request");
    }

    #[tokio::test]
    async fn test_unknown_label_is_not_found_page() {
        let (_, app) = proxy();
        let req = http::Request::builder()
            .uri("/")
            .header(header::HOST, "nosuch.ctf.local")
            .body(Body::empty())
            .unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("does not exist"));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (routes, app) = proxy();
        routes.add_app("dead", App::http(format!("127.0.0.1:{port}")));

        let req = http::Request::builder()
            .uri("/")
            .header(header::HOST, "dead.ctf.local")
            .body(Body::empty())
            .unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }
}
