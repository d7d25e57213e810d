//! Fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::network::Network;
use crate::request::{CacheKey, Request, Response};
use crate::storage::{CacheStorage, MemoryStorage, Namespace};

pub const ORIGIN: &str = "https://shoresquad.test/";

/// A network that serves canned responses by URL and counts calls.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` with status 200 at `path` under [`ORIGIN`].
    pub fn serve(&self, path: &str, body: &str) {
        self.serve_response(path, Response::new(200, body.to_string()));
    }

    pub fn serve_response(&self, path: &str, response: Response) {
        let url = reqwest::Url::parse(ORIGIN).unwrap().join(path).unwrap();
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }
        let found = self
            .routes
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned();
        found.ok_or_else(|| Error::Network(format!("connection refused: {}", request.url)))
    }
}

/// Memory storage with switchable failures.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_puts: AtomicBool,
    /// Single-entry puts never complete.
    pub stall_puts: AtomicBool,
    pub fail_lookups: AtomicBool,
    pub fail_listing: AtomicBool,
    pub undeletable: Mutex<Option<Namespace>>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, ns: &Namespace) -> Result<()> {
        self.inner.open(ns).await
    }

    async fn namespaces(&self) -> Result<Vec<Namespace>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::Storage("listing unavailable".into()));
        }
        self.inner.namespaces().await
    }

    async fn delete(&self, ns: &Namespace) -> Result<bool> {
        if self.undeletable.lock().unwrap().as_ref() == Some(ns) {
            return Err(Error::Storage(format!("{ns} is locked")));
        }
        self.inner.delete(ns).await
    }

    async fn lookup(&self, ns: &Namespace, key: &CacheKey) -> Result<Option<Response>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Error::Storage("read failed".into()));
        }
        self.inner.lookup(ns, key).await
    }

    async fn put(&self, ns: &Namespace, key: &CacheKey, response: &Response) -> Result<()> {
        if self.stall_puts.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk full".into()));
        }
        self.inner.put(ns, key, response).await
    }

    async fn put_all(&self, ns: &Namespace, entries: &[(CacheKey, Response)]) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk full".into()));
        }
        self.inner.put_all(ns, entries).await
    }

    async fn keys(&self, ns: &Namespace) -> Result<Vec<CacheKey>> {
        self.inner.keys(ns).await
    }
}
