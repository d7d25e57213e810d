//! Cache-first gateway: install, activate, and fetch-intercept.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::{StreamExt, TryStreamExt, future, stream};
use reqwest::Method;

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::request::{CacheKey, Request, Response};
use crate::stats::GatewayStats;
use crate::storage::{CacheStorage, Namespace};
use crate::whitelist::StaticAssetWhitelist;

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from the current namespace without network access.
    Cache,
    /// Fetched from the network.
    Network,
}

/// Outcome of a successful install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Namespace that was populated.
    pub namespace: Namespace,
    /// Number of manifest entries stored.
    pub entries: usize,
    /// Total body bytes stored.
    pub bytes: u64,
    /// Time taken by the whole phase.
    pub elapsed: Duration,
}

/// Outcome of an activate phase.
#[derive(Debug, Clone)]
pub struct ActivateReport {
    /// Namespace that is now current.
    pub namespace: Namespace,
    /// Stale namespaces that were removed.
    pub deleted: Vec<Namespace>,
    /// Stale namespaces that could not be removed, with the reason.
    pub failed: Vec<(Namespace, String)>,
}

impl ActivateReport {
    /// Returns true if every stale namespace was removed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A duplicate response waiting to be persisted.
///
/// Committing is independent of delivering the original response: the caller
/// may already have returned it before this runs.
#[must_use = "a pending write does nothing unless committed"]
pub struct PendingWrite<S: CacheStorage> {
    storage: Arc<S>,
    stats: Arc<GatewayStats>,
    retired: Arc<AtomicBool>,
    namespace: Namespace,
    key: CacheKey,
    response: Response,
}

impl<S: CacheStorage> PendingWrite<S> {
    /// Persists the duplicate. Failures are logged and swallowed.
    ///
    /// Writes for a gateway that has been superseded are discarded so a
    /// namespace removed by a newer version's activate is not recreated.
    ///
    /// Returns true if the entry was written.
    pub async fn commit(self) -> bool {
        if self.retired.load(Ordering::SeqCst) {
            log::debug!("Discarding write of {} to retired {}", self.key, self.namespace);
            return false;
        }
        match self
            .storage
            .put(&self.namespace, &self.key, &self.response)
            .await
        {
            Ok(()) => {
                log::debug!("Stored {} in {}", self.key, self.namespace);
                self.stats.record_store(true);
                true
            }
            Err(e) => {
                let err = Error::CacheWrite {
                    key: self.key.to_string(),
                    reason: e.to_string(),
                };
                log::warn!("{err}");
                self.stats.record_store(false);
                false
            }
        }
    }
}

/// Result of intercepting one request.
pub struct Intercepted<S: CacheStorage> {
    /// The response to hand back to the caller, untouched.
    pub response: Response,
    /// Whether it came from the cache or the network.
    pub source: Source,
    /// Cache write to perform after (or concurrently with) delivery.
    pub pending: Option<PendingWrite<S>>,
}

/// Offline cache gateway for one deployed version.
pub struct Gateway<S: CacheStorage, N: Network> {
    storage: Arc<S>,
    network: Arc<N>,
    config: GatewayConfig,
    namespace: Namespace,
    whitelist: StaticAssetWhitelist,
    stats: Arc<GatewayStats>,
    retired: Arc<AtomicBool>,
}

impl<S: CacheStorage, N: Network> Gateway<S, N> {
    /// Creates a gateway for the version described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNamespace`] if the configured name and version
    /// do not form a valid namespace.
    pub fn new(storage: Arc<S>, network: Arc<N>, config: GatewayConfig) -> Result<Self> {
        let namespace = config.namespace()?;
        let whitelist = config.whitelist();
        if whitelist.is_empty() {
            log::warn!("No static extensions configured for {namespace}; misses will never be stored");
        }
        Ok(Self {
            storage,
            network,
            config,
            namespace,
            whitelist,
            stats: Arc::new(GatewayStats::new()),
            retired: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The current namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Traffic counters.
    #[must_use]
    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    /// Marks this gateway as superseded. Pending writes it handed out are
    /// dropped instead of committed from now on.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    /// Opens the current namespace and stores every precache manifest entry.
    ///
    /// All entries are fetched before anything is written; if any fetch fails
    /// or returns a non-2xx status, nothing is stored and the phase fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallFetch`] for the first manifest entry that could
    /// not be retrieved, or a storage error if the batch cannot be written.
    pub async fn install(&self) -> Result<InstallReport> {
        let start = Instant::now();
        let urls = self
            .config
            .precache
            .iter()
            .map(|entry| self.config.resolve(entry))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Installing {} ({} precache entries)",
            self.namespace,
            urls.len()
        );
        self.storage.open(&self.namespace).await?;

        let network = &self.network;
        let fetched: Vec<(CacheKey, Response)> = stream::iter(urls)
            .map(|url| async move {
                let request = Request::get(url);
                let response = network
                    .fetch(&request)
                    .await
                    .map_err(|e| Error::InstallFetch {
                        url: request.url.to_string(),
                        reason: e.to_string(),
                    })?;
                if !response.is_success() {
                    return Err(Error::InstallFetch {
                        url: request.url.to_string(),
                        reason: format!("unexpected status {}", response.status),
                    });
                }
                Ok::<_, Error>((request.key(), response))
            })
            .buffered(self.config.install_concurrency.max(1))
            .try_collect()
            .await
            .inspect_err(|e| log::error!("Install of {} aborted: {e}", self.namespace))?;

        self.storage.put_all(&self.namespace, &fetched).await?;

        let bytes = fetched.iter().map(|(_, r)| r.body.len() as u64).sum();
        let report = InstallReport {
            namespace: self.namespace.clone(),
            entries: fetched.len(),
            bytes,
            elapsed: start.elapsed(),
        };
        log::info!(
            "Installed {}: {} entries, {} bytes",
            report.namespace,
            report.entries,
            report.bytes
        );
        Ok(report)
    }

    /// Deletes every namespace other than the current one.
    ///
    /// Individual deletion failures are logged and reported but do not stop
    /// the remaining deletions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NamespaceEnumeration`] if the existing namespaces
    /// cannot be listed.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let existing = self.storage.namespaces().await.map_err(|e| {
            log::error!("Activate of {}: cannot list namespaces: {e}", self.namespace);
            Error::NamespaceEnumeration(e.to_string())
        })?;

        let stale: Vec<Namespace> = existing
            .into_iter()
            .filter(|ns| *ns != self.namespace)
            .collect();

        let results = future::join_all(stale.into_iter().map(|ns| async move {
            let result = self.storage.delete(&ns).await;
            (ns, result)
        }))
        .await;

        let mut report = ActivateReport {
            namespace: self.namespace.clone(),
            deleted: Vec::new(),
            failed: Vec::new(),
        };
        for (ns, result) in results {
            match result {
                Ok(_) => {
                    log::info!("Deleted stale cache {ns}");
                    report.deleted.push(ns);
                }
                Err(e) => {
                    log::warn!("Failed to delete stale cache {ns}: {e}");
                    report.failed.push((ns, e.to_string()));
                }
            }
        }

        log::info!(
            "Activated {} ({} stale removed, {} failed)",
            self.namespace,
            report.deleted.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Serves a request cache-first, falling back to the network.
    ///
    /// On a miss whose URL matches the static-asset whitelist, the network
    /// response is duplicated into [`Intercepted::pending`]; the original is
    /// returned either way. Non-GET requests skip the cache entirely.
    ///
    /// # Errors
    ///
    /// Returns the network error unchanged when there was no cached entry and
    /// the network fetch failed.
    pub async fn intercept(&self, request: &Request) -> Result<Intercepted<S>> {
        if request.method != Method::GET {
            self.stats.record_bypass();
            log::debug!("Bypassing cache for {} {}", request.method, request.url);
            let response = self.fetch_network(request).await?;
            return Ok(Intercepted {
                response,
                source: Source::Network,
                pending: None,
            });
        }

        let key = request.key();
        match self.storage.lookup(&self.namespace, &key).await {
            Ok(Some(response)) => {
                self.stats.record_hit(response.body.len());
                log::debug!("Cache hit: {key}");
                return Ok(Intercepted {
                    response,
                    source: Source::Cache,
                    pending: None,
                });
            }
            Ok(None) => {}
            Err(e) => log::warn!("Cache lookup failed for {key}, treating as miss: {e}"),
        }

        self.stats.record_miss();
        let response = self.fetch_network(request).await?;

        let pending = self.is_storable(request, &response).then(|| PendingWrite {
            storage: Arc::clone(&self.storage),
            stats: Arc::clone(&self.stats),
            retired: Arc::clone(&self.retired),
            namespace: self.namespace.clone(),
            key,
            response: response.clone(),
        });

        Ok(Intercepted {
            response,
            source: Source::Network,
            pending,
        })
    }

    async fn fetch_network(&self, request: &Request) -> Result<Response> {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.stats.record_network(response.body.len());
                Ok(response)
            }
            Err(e) => {
                self.stats.record_network_error();
                log::debug!("Network fetch failed for {}: {e}", request.url);
                Err(e)
            }
        }
    }

    fn is_storable(&self, request: &Request, response: &Response) -> bool {
        if !self.whitelist.matches(&request.url) {
            return false;
        }
        if !response.is_success() && !self.config.cache_error_responses {
            log::debug!(
                "Not storing {} response for {}",
                response.status,
                request.url
            );
            return false;
        }
        true
    }
}

impl<S: CacheStorage + 'static, N: Network> Gateway<S, N> {
    /// Intercepts a request and returns its response, persisting any cache
    /// write on a background task so delivery never waits on storage.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`intercept`](Self::intercept).
    pub async fn handle_fetch(&self, request: Request) -> Result<Response> {
        let Intercepted {
            response, pending, ..
        } = self.intercept(&request).await?;
        if let Some(write) = pending {
            tokio::spawn(write.commit());
        }
        Ok(response)
    }
}
