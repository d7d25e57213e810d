//! Request and response values exchanged with the gateway.

use std::fmt;

use bytes::Bytes;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An outbound request as observed by the gateway.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Request headers in the order they were given.
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Creates a request with no headers.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
        }
    }

    /// Creates a `GET` request for the given URL.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parses `url` and creates a `GET` request for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` is not an absolute URL.
    pub fn parse_get(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::get(url))
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the cache key identifying this request.
    #[must_use]
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.method, &self.url)
    }
}

/// Identity of a cache entry: method plus full URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for a method and URL.
    #[must_use]
    pub fn new(method: &Method, url: &Url) -> Self {
        Self(format!("{} {}", method.as_str(), url.as_str()))
    }

    /// Returns the key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully-buffered response snapshot.
///
/// Cloning is the duplicate operation used when persisting: the body is
/// reference-counted, so the original handed back to the caller is never
/// consumed or altered by a cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in wire order. Values are raw bytes, since origins
    /// may send octets outside visible ASCII.
    pub headers: Vec<(String, Vec<u8>)>,
    /// Complete body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        self.headers.push((name.into(), value.as_ref().to_vec()));
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns the first header value matching `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_includes_method_and_full_url() {
        let req = Request::parse_get("https://example.org/css/styles.css?v=2").unwrap();
        assert_eq!(
            req.key().as_str(),
            "GET https://example.org/css/styles.css?v=2"
        );
    }

    #[test]
    fn key_differs_by_method() {
        let url = Url::parse("https://example.org/form").unwrap();
        let get = Request::get(url.clone()).key();
        let post = Request::new(Method::POST, url).key();
        assert_ne!(get, post);
    }

    #[test]
    fn parse_get_rejects_relative_urls() {
        let err = Request::parse_get("/index.html").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn response_header_lookup_is_case_insensitive() {
        let resp = Response::new(200, "body").with_header("Content-Type", "text/css");
        assert_eq!(resp.header("content-type"), Some(b"text/css".as_slice()));
        assert_eq!(resp.header("etag"), None);
    }

    #[test]
    fn header_values_keep_non_ascii_octets() {
        let resp = Response::new(200, "").with_header("Content-Disposition", b"filename=\"caf\xE9.css\"");
        assert_eq!(
            resp.header("content-disposition"),
            Some(b"filename=\"caf\xE9.css\"".as_slice())
        );
    }

    #[test]
    fn success_range() {
        assert!(Response::new(200, "").is_success());
        assert!(Response::new(204, "").is_success());
        assert!(!Response::new(304, "").is_success());
        assert!(!Response::new(404, "").is_success());
    }

    #[test]
    fn clone_shares_body() {
        let original = Response::new(200, Bytes::from_static(b"hello"));
        let dup = original.clone();
        assert_eq!(original, dup);
        assert_eq!(original.body.as_ptr(), dup.body.as_ptr());
    }
}
