//! Deployment sequencing across gateway versions.
//!
//! The host owns ordering: a new version is installed first and, only if
//! install succeeded, takes over requests before stale versions are
//! activated away. The superseded gateway is retired at the cut-over so its
//! in-flight cache writes cannot recreate a namespace activate removes. When
//! install fails the previously active version keeps serving.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::gateway::{ActivateReport, Gateway, InstallReport};
use crate::network::Network;
use crate::request::{Request, Response};
use crate::storage::CacheStorage;

/// Summary of a successful deployment.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Install phase outcome.
    pub install: InstallReport,
    /// Activate phase outcome, if listing namespaces succeeded.
    pub activate: Option<ActivateReport>,
}

/// Runs gateways in lifecycle order and routes requests to the active one.
pub struct Host<S: CacheStorage, N: Network> {
    storage: Arc<S>,
    network: Arc<N>,
    active: RwLock<Option<Arc<Gateway<S, N>>>>,
}

impl<S: CacheStorage + 'static, N: Network> Host<S, N> {
    /// Creates a host with no active version.
    #[must_use]
    pub fn new(storage: Arc<S>, network: Arc<N>) -> Self {
        Self {
            storage,
            network,
            active: RwLock::new(None),
        }
    }

    /// Installs and activates the version described by `config`.
    ///
    /// An activation failure is logged and does not undo the cut-over.
    ///
    /// # Errors
    ///
    /// Returns the install error if the new version could not be installed;
    /// the previously active version, if any, remains active.
    pub async fn deploy(&self, config: GatewayConfig) -> Result<Deployment> {
        let gateway = Arc::new(Gateway::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.network),
            config,
        )?);

        let install = match gateway.install().await {
            Ok(report) => report,
            Err(e) => {
                match self.active_namespace().await {
                    Some(ns) => log::error!("Deploy failed, {ns} keeps serving: {e}"),
                    None => log::error!("Deploy failed with no previous version: {e}"),
                }
                return Err(e);
            }
        };

        let previous = self.active.write().await.replace(Arc::clone(&gateway));
        if let Some(old) = previous {
            log::info!("Retiring {}", old.namespace());
            old.retire();
        }

        let activate = match gateway.activate().await {
            Ok(report) => Some(report),
            Err(e) => {
                log::warn!("Activation of {} incomplete: {e}", gateway.namespace());
                None
            }
        };

        Ok(Deployment { install, activate })
    }

    /// Returns the active gateway, if any.
    pub async fn active(&self) -> Option<Arc<Gateway<S, N>>> {
        self.active.read().await.clone()
    }

    /// Returns the namespace of the active gateway, if any.
    pub async fn active_namespace(&self) -> Option<String> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|gw| gw.namespace().to_string())
    }

    /// Routes a request through the active gateway.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotActive`] before the first successful deploy, or
    /// whatever the gateway returns.
    pub async fn fetch(&self, request: Request) -> Result<Response> {
        let gateway = self.active().await.ok_or(Error::NotActive)?;
        gateway.handle_fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Namespace};
    use crate::testing::{FakeNetwork, FlakyStorage, ORIGIN};
    use std::sync::atomic::Ordering;

    fn config(version: &str, precache: &[&str]) -> GatewayConfig {
        GatewayConfig::new()
            .with_cache_name("")
            .with_version(version)
            .with_origin(ORIGIN)
            .with_precache(precache.iter().copied())
    }

    fn site() -> Arc<FakeNetwork> {
        let net = FakeNetwork::new();
        net.serve("/index.html", "<html>home</html>");
        net.serve("/css/styles.css", "body {}");
        Arc::new(net)
    }

    #[tokio::test]
    async fn fetch_before_deploy_is_not_active() {
        let host = Host::new(Arc::new(MemoryStorage::new()), site());
        let req = Request::parse_get("https://shoresquad.test/index.html").unwrap();
        assert!(matches!(host.fetch(req).await, Err(Error::NotActive)));
    }

    #[tokio::test]
    async fn failed_deploy_keeps_previous_version() {
        let storage = Arc::new(MemoryStorage::new());
        let host = Host::new(Arc::clone(&storage), site());

        host.deploy(config("v1", &["/index.html"])).await.unwrap();
        let err = host
            .deploy(config("v2", &["/index.html", "/gone.css"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InstallFetch { .. }));
        assert_eq!(host.active_namespace().await.as_deref(), Some("v1"));

        // v1 entries were not evicted by the failed upgrade.
        let v1 = Namespace::new("v1").unwrap();
        assert_eq!(storage.entry_count(&v1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn activation_failure_still_cuts_over() {
        let storage = Arc::new(FlakyStorage::new());
        let host = Host::new(Arc::clone(&storage), site());
        host.deploy(config("v1", &["/index.html"])).await.unwrap();

        storage.fail_listing.store(true, Ordering::SeqCst);
        let deployment = host.deploy(config("v2", &["/index.html"])).await.unwrap();
        assert!(deployment.activate.is_none());
        assert_eq!(host.active_namespace().await.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn superseded_version_cannot_recreate_its_namespace() {
        let net = site();
        net.serve("/js/app.js", "console.log(1)");
        let storage = Arc::new(MemoryStorage::new());
        let host = Host::new(Arc::clone(&storage), net);
        host.deploy(config("v1", &["/index.html"])).await.unwrap();

        let old = host.active().await.unwrap();
        let req = Request::parse_get("https://shoresquad.test/js/app.js").unwrap();
        let pending = old.intercept(&req).await.unwrap().pending.unwrap();

        host.deploy(config("v2", &["/index.html"])).await.unwrap();
        assert!(!pending.commit().await);
        assert_eq!(
            storage.namespaces().await.unwrap(),
            vec![Namespace::new("v2").unwrap()]
        );
    }

    #[tokio::test]
    async fn deploy_routes_fetches_to_new_version() {
        let net = site();
        let host = Host::new(Arc::new(MemoryStorage::new()), Arc::clone(&net));
        let deployment = host
            .deploy(config("v1", &["/index.html", "/css/styles.css"]))
            .await
            .unwrap();
        assert_eq!(deployment.install.entries, 2);
        assert!(deployment.activate.unwrap().is_clean());

        let calls = net.calls();
        let req = Request::parse_get("https://shoresquad.test/index.html").unwrap();
        let resp = host.fetch(req).await.unwrap();
        assert_eq!(resp.body.as_ref(), b"<html>home</html>");
        assert_eq!(net.calls(), calls);
    }
}
