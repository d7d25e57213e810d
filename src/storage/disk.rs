//! File-system storage backend.
//!
//! Layout: `<root>/<namespace>/<sha256(key)>.toml`, one file per entry.
//! Entries are written to a hidden temporary file and renamed into place, so
//! a reader never observes a half-written entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{CacheStorage, Namespace};
use crate::error::{Error, Result};
use crate::request::{CacheKey, Response};

const ENTRY_EXT: &str = "toml";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk representation of one cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    key: CacheKey,
    status: u16,
    stored_at: DateTime<Utc>,
    /// Header names with base64-encoded values.
    headers: Vec<(String, String)>,
    /// Base64-encoded body.
    body: String,
}

impl StoredEntry {
    fn capture(key: &CacheKey, response: &Response) -> Self {
        Self {
            key: key.clone(),
            status: response.status,
            stored_at: Utc::now(),
            headers: response
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), BASE64.encode(value)))
                .collect(),
            body: BASE64.encode(&response.body),
        }
    }

    fn into_response(self) -> Result<Response> {
        let body = BASE64
            .decode(&self.body)
            .map_err(|e| Error::Storage(format!("corrupt body for {}: {e}", self.key)))?;
        let headers = self
            .headers
            .into_iter()
            .map(|(name, value)| {
                BASE64
                    .decode(&value)
                    .map(|value| (name, value))
                    .map_err(|e| Error::Storage(format!("corrupt header for {}: {e}", self.key)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Response {
            status: self.status,
            headers,
            body: body.into(),
        })
    }
}

/// Storage rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, ns: &Namespace) -> PathBuf {
        self.root.join(ns.as_str())
    }

    fn entry_path(&self, ns: &Namespace, key: &CacheKey) -> PathBuf {
        self.namespace_dir(ns)
            .join(format!("{}.{ENTRY_EXT}", key_digest(key)))
    }

    /// Serializes an entry into a unique hidden temp file next to its final path.
    async fn write_temp(&self, ns: &Namespace, key: &CacheKey, response: &Response) -> Result<PathBuf> {
        let entry = StoredEntry::capture(key, response);
        let text = toml::to_string(&entry).map_err(|e| Error::CacheWrite {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let tmp = self.namespace_dir(ns).join(format!(
            ".{}.{}.{}.tmp",
            key_digest(key),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, text).await?;
        Ok(tmp)
    }

    async fn read_entry(path: &Path) -> Result<Option<StoredEntry>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => toml::from_str(&text)
                .map(Some)
                .map_err(|e| Error::Storage(format!("corrupt entry {}: {e}", path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Paths of all committed entry files in a namespace.
    async fn entry_files(&self, ns: &Namespace) -> Result<Vec<PathBuf>> {
        let mut read_dir = match tokio::fs::read_dir(self.namespace_dir(ns)).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let hidden = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
            if !hidden && path.extension().is_some_and(|ext| ext == ENTRY_EXT) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// Hex SHA-256 of the key, used as the entry file stem.
fn key_digest(key: &CacheKey) -> String {
    let hash = Sha256::digest(key.as_str().as_bytes());
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, ns: &Namespace) -> Result<()> {
        tokio::fs::create_dir_all(self.namespace_dir(ns)).await?;
        Ok(())
    }

    async fn namespaces(&self) -> Result<Vec<Namespace>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            // Hidden or otherwise invalid directory names are not namespaces.
            if let Ok(ns) = Namespace::new(entry.file_name().to_string_lossy().into_owned()) {
                found.push(ns);
            }
        }
        found.sort();
        Ok(found)
    }

    async fn delete(&self, ns: &Namespace) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.namespace_dir(ns)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn lookup(&self, ns: &Namespace, key: &CacheKey) -> Result<Option<Response>> {
        match Self::read_entry(&self.entry_path(ns, key)).await? {
            Some(entry) if entry.key == *key => entry.into_response().map(Some),
            _ => Ok(None),
        }
    }

    async fn put(&self, ns: &Namespace, key: &CacheKey, response: &Response) -> Result<()> {
        self.open(ns).await?;
        let tmp = self.write_temp(ns, key, response).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.entry_path(ns, key)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn put_all(&self, ns: &Namespace, entries: &[(CacheKey, Response)]) -> Result<()> {
        self.open(ns).await?;

        // Stage every entry before committing any of them.
        let mut staged = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            match self.write_temp(ns, key, response).await {
                Ok(tmp) => staged.push((tmp, self.entry_path(ns, key))),
                Err(e) => {
                    for (tmp, _) in &staged {
                        let _ = tokio::fs::remove_file(tmp).await;
                    }
                    return Err(e);
                }
            }
        }

        for (i, (tmp, dest)) in staged.iter().enumerate() {
            if let Err(e) = tokio::fs::rename(tmp, dest).await {
                for (leftover, _) in &staged[i..] {
                    let _ = tokio::fs::remove_file(leftover).await;
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn keys(&self, ns: &Namespace) -> Result<Vec<CacheKey>> {
        let mut keys = Vec::new();
        for path in self.entry_files(ns).await? {
            if let Some(entry) = Self::read_entry(&path).await? {
                keys.push(entry.key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn entry_count(&self, ns: &Namespace) -> Result<usize> {
        Ok(self.entry_files(ns).await?.len())
    }
}
