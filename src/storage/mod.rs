//! Durable cache storage abstraction.
//!
//! The gateway never touches storage directly; it operates on an injected
//! [`CacheStorage`] handle so the install / activate / fetch lifecycle can be
//! exercised against [`MemoryStorage`] in tests and [`DiskStorage`] in
//! production.

mod disk;
mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::request::{CacheKey, Response};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// Identifier for one generation of stored entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Validates and wraps a raw namespace identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNamespace`] if `name` is empty, starts with a
    /// dot, or contains a path separator.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.chars().any(char::is_control)
        {
            return Err(Error::InvalidNamespace(name));
        }
        Ok(Self(name))
    }

    /// Builds `"{cache_name}-{version}"`, or just `version` when the cache
    /// name is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNamespace`] if the result is not a valid name.
    pub fn for_version(cache_name: &str, version: &str) -> Result<Self> {
        if version.is_empty() {
            return Err(Error::InvalidNamespace(cache_name.to_string()));
        }
        if cache_name.is_empty() {
            Self::new(version)
        } else {
            Self::new(format!("{cache_name}-{version}"))
        }
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Namespace {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

/// Abstraction over namespaced cache storage.
///
/// Implementations must make each write all-or-nothing: a concurrent
/// [`lookup`](Self::lookup) sees either the complete previous entry or the
/// complete new one.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens a namespace, creating it if absent.
    async fn open(&self, ns: &Namespace) -> Result<()>;

    /// Lists every namespace currently present, in sorted order.
    async fn namespaces(&self) -> Result<Vec<Namespace>>;

    /// Deletes a namespace and all of its entries.
    ///
    /// Returns `false` if the namespace did not exist.
    async fn delete(&self, ns: &Namespace) -> Result<bool>;

    /// Looks up an entry. A missing namespace is treated as a miss.
    async fn lookup(&self, ns: &Namespace, key: &CacheKey) -> Result<Option<Response>>;

    /// Stores an entry, overwriting any previous value for the key.
    async fn put(&self, ns: &Namespace, key: &CacheKey, response: &Response) -> Result<()>;

    /// Stores a batch of entries.
    async fn put_all(&self, ns: &Namespace, entries: &[(CacheKey, Response)]) -> Result<()>;

    /// Lists the keys stored in a namespace, in sorted order.
    async fn keys(&self, ns: &Namespace) -> Result<Vec<CacheKey>>;

    /// Returns the number of entries in a namespace.
    async fn entry_count(&self, ns: &Namespace) -> Result<usize> {
        Ok(self.keys(ns).await?.len())
    }
}
