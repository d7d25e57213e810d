//! Network abstraction for testability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{Request, Response};

/// Something that can turn a request into a complete response.
///
/// Implementations return only once the whole body is available, so a
/// response handed to the gateway can always be committed to storage as-is.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Default network implementation using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    /// Creates a network handle with a pooled client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(build_http_client()?))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Builds a configured HTTP client for origin requests.
fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();
        let body = resp.bytes().await?;

        log::debug!(
            "{} {} -> {status} ({} bytes)",
            request.method,
            request.url,
            body.len()
        );

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_network_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpNetwork>();
    }

    #[test]
    fn builds_default_client() {
        assert!(HttpNetwork::new().is_ok());
    }

    #[tokio::test]
    async fn unreachable_host_is_http_error() {
        let net = HttpNetwork::new().unwrap();
        // Port 9 on the loopback interface ("discard") is not expected to be listening.
        let req = Request::parse_get("http://127.0.0.1:9/index.html").unwrap();
        let err = net.fetch(&req).await.unwrap_err();
        assert!(matches!(err, crate::Error::Http(_)));
    }

    #[tokio::test]
    async fn keeps_headers_with_non_ascii_values() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(
                b"HTTP/1.1 200 OK\r\n\
                  Content-Length: 2\r\n\
                  X-Plain: ok\r\n\
                  Content-Disposition: inline; filename=\"caf\xE9.css\"\r\n\
                  Connection: close\r\n\r\nok",
            )
            .await
            .unwrap();
        });

        let net = HttpNetwork::new().unwrap();
        let req = Request::parse_get(&format!("http://{addr}/caf.css")).unwrap();
        let resp = net.fetch(&req).await.unwrap();

        assert_eq!(resp.body.as_ref(), b"ok");
        assert_eq!(resp.header("x-plain"), Some(b"ok".as_slice()));
        assert_eq!(
            resp.header("content-disposition"),
            Some(b"inline; filename=\"caf\xE9.css\"".as_slice())
        );
    }
}
