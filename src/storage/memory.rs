//! In-process storage backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheStorage, Namespace};
use crate::error::Result;
use crate::request::{CacheKey, Response};

type Entries = BTreeMap<CacheKey, Response>;

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    namespaces: RwLock<BTreeMap<Namespace, Entries>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, ns: &Namespace) -> Result<()> {
        self.namespaces
            .write()
            .await
            .entry(ns.clone())
            .or_default();
        Ok(())
    }

    async fn namespaces(&self) -> Result<Vec<Namespace>> {
        Ok(self.namespaces.read().await.keys().cloned().collect())
    }

    async fn delete(&self, ns: &Namespace) -> Result<bool> {
        Ok(self.namespaces.write().await.remove(ns).is_some())
    }

    async fn lookup(&self, ns: &Namespace, key: &CacheKey) -> Result<Option<Response>> {
        Ok(self
            .namespaces
            .read()
            .await
            .get(ns)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, ns: &Namespace, key: &CacheKey, response: &Response) -> Result<()> {
        self.namespaces
            .write()
            .await
            .entry(ns.clone())
            .or_default()
            .insert(key.clone(), response.clone());
        Ok(())
    }

    async fn put_all(&self, ns: &Namespace, entries: &[(CacheKey, Response)]) -> Result<()> {
        // One write guard for the whole batch keeps it invisible until complete.
        let mut namespaces = self.namespaces.write().await;
        let target = namespaces.entry(ns.clone()).or_default();
        for (key, response) in entries {
            target.insert(key.clone(), response.clone());
        }
        Ok(())
    }

    async fn keys(&self, ns: &Namespace) -> Result<Vec<CacheKey>> {
        Ok(self
            .namespaces
            .read()
            .await
            .get(ns)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}
