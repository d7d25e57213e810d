//! Local HTTP proxy that puts the gateway in front of an origin.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use reqwest::Url;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::host::Host;
use crate::network::Network;
use crate::request::{Request, Response};
use crate::stats::StatsSnapshot;
use crate::storage::CacheStorage;

/// Path of the JSON counters endpoint.
pub const STATS_PATH: &str = "/__gateway/stats";

/// Headers that describe a single connection and must not be relayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "host",
];

struct ProxyState<S: CacheStorage, N: Network> {
    host: Arc<Host<S, N>>,
    origin: Url,
}

impl<S: CacheStorage, N: Network> Clone for ProxyState<S, N> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            origin: self.origin.clone(),
        }
    }
}

#[derive(Serialize)]
struct StatsResponse {
    namespace: String,
    #[serde(flatten)]
    stats: StatsSnapshot,
    hit_ratio: f64,
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

fn into_http(resp: Response) -> HttpResponse {
    let mut builder = axum::http::Response::builder().status(resp.status);
    for (name, value) in resp.headers.iter().filter(|(n, _)| !is_hop_by_hop(n)) {
        builder = builder.header(name.as_str(), value.as_slice());
    }
    builder
        .body(Body::from(resp.body))
        .unwrap_or_else(|e| (StatusCode::BAD_GATEWAY, e.to_string()).into_response())
}

async fn api_stats<S, N>(State(state): State<ProxyState<S, N>>) -> HttpResponse
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let Some(gateway) = state.host.active().await else {
        return (StatusCode::SERVICE_UNAVAILABLE, "no active cache version").into_response();
    };
    let stats = gateway.stats().snapshot();
    axum::Json(StatsResponse {
        namespace: gateway.namespace().to_string(),
        hit_ratio: stats.hit_ratio(),
        stats,
    })
    .into_response()
}

async fn proxy<S, N>(
    State(state): State<ProxyState<S, N>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> HttpResponse
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let Ok(url) = state.origin.join(path) else {
        return (StatusCode::BAD_REQUEST, "invalid request path").into_response();
    };
    let Ok(method) = reqwest::Method::from_bytes(method.as_str().as_bytes()) else {
        return (StatusCode::METHOD_NOT_ALLOWED, "unsupported method").into_response();
    };

    let mut request = Request::new(method, url);
    for (name, value) in &headers {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request.headers.push((name.as_str().to_string(), value.to_string()));
        }
    }

    match state.host.fetch(request).await {
        Ok(resp) => into_http(resp),
        Err(Error::NotActive) => {
            (StatusCode::SERVICE_UNAVAILABLE, "no active cache version").into_response()
        }
        Err(e) => {
            log::warn!("Proxy request for {path} failed: {e}");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Builds the proxy router. Every path except [`STATS_PATH`] is forwarded
/// through the host's active gateway to `origin`.
pub fn router<S, N>(host: Arc<Host<S, N>>, origin: Url) -> Router
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let state = ProxyState { host, origin };
    Router::new()
        .route(STATS_PATH, get(api_stats::<S, N>))
        .fallback(proxy::<S, N>)
        .with_state(state)
}

/// Serves the proxy until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn run<S, N>(host: Arc<Host<S, N>>, origin: Url, bind_host: &str, port: u16) -> Result<()>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let addr: SocketAddr = format!("{bind_host}:{port}").parse().map_err(|e| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid bind address {bind_host}:{port}: {e}"),
        ))
    })?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Proxying {origin} on http://{addr}");

    axum::serve(listener, router(host, origin))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Received SIGINT");
        })
        .await?;

    log::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::storage::MemoryStorage;
    use crate::testing::{FakeNetwork, ORIGIN};

    async fn spawn_proxy(host: Arc<Host<MemoryStorage, FakeNetwork>>) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(host, Url::parse(ORIGIN).unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn site() -> Arc<FakeNetwork> {
        let net = FakeNetwork::new();
        net.serve_response(
            "/index.html",
            Response::new(200, "<html>home</html>")
                .with_header("content-type", "text/html")
                .with_header("connection", "close"),
        );
        net.serve("/api/data.json", "{}");
        Arc::new(net)
    }

    #[test]
    fn hop_by_hop_detection() {
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("connection"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[test]
    fn into_http_strips_hop_by_hop_headers() {
        let resp = into_http(
            Response::new(404, "gone")
                .with_header("Content-Type", "text/plain")
                .with_header("Transfer-Encoding", "chunked"),
        );
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()["content-type"], "text/plain");
        assert!(resp.headers().get("transfer-encoding").is_none());
    }

    #[test]
    fn into_http_relays_non_ascii_header_bytes() {
        let resp = into_http(
            Response::new(200, "ok").with_header("Content-Disposition", b"inline; filename=\"caf\xE9.css\""),
        );
        assert_eq!(
            resp.headers()["content-disposition"].as_bytes(),
            b"inline; filename=\"caf\xE9.css\""
        );
    }

    #[tokio::test]
    async fn proxy_unavailable_before_deploy() {
        let host = Arc::new(Host::new(Arc::new(MemoryStorage::new()), site()));
        let addr = spawn_proxy(host).await;

        let resp = reqwest::get(format!("http://{addr}/index.html")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 503);
    }

    #[tokio::test]
    async fn proxy_serves_precached_and_reports_stats() {
        let net = site();
        let host = Arc::new(Host::new(Arc::new(MemoryStorage::new()), Arc::clone(&net)));
        host.deploy(
            GatewayConfig::new()
                .with_origin(ORIGIN)
                .with_precache(["/index.html"]),
        )
        .await
        .unwrap();
        let addr = spawn_proxy(host).await;

        let resp = reqwest::get(format!("http://{addr}/index.html")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(resp.headers()["content-type"], "text/html");
        assert_eq!(resp.text().await.unwrap(), "<html>home</html>");

        let missing = reqwest::get(format!("http://{addr}/nowhere.css")).await.unwrap();
        assert_eq!(missing.status().as_u16(), 502);

        let body = reqwest::get(format!("http://{addr}{STATS_PATH}"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(stats["namespace"], "shoresquad-v1");
        assert_eq!(stats["hits"], 1);
        assert_eq!(stats["misses"], 1);
        assert_eq!(stats["network_errors"], 1);
    }
}
