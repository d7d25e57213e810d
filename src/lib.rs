//! shoresquad-cache - an offline cache gateway.
//!
//! Serves requests cache-first with network fallback from a versioned cache
//! namespace. A new version is populated from a precache manifest during
//! install, stale namespaces are evicted on activate, and static assets
//! fetched on a miss are stored for next time.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shoresquad_cache::{DiskStorage, Gateway, GatewayConfig, HttpNetwork, Request};
//!
//! # async fn example() -> shoresquad_cache::Result<()> {
//! let storage = Arc::new(DiskStorage::new("/var/lib/shoresquad-cache"));
//! let network = Arc::new(HttpNetwork::new()?);
//! let config = GatewayConfig::new().with_origin("https://shoresquad.example/");
//!
//! let gateway = Gateway::new(storage, network, config)?;
//! gateway.install().await?;
//! gateway.activate().await?;
//!
//! let response = gateway
//!     .handle_fetch(Request::parse_get("https://shoresquad.example/css/styles.css")?)
//!     .await?;
//! println!("{} ({} bytes)", response.status, response.body.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod gateway;
pub mod host;
pub mod network;
pub mod request;
#[cfg(feature = "server")]
pub mod server;
pub mod stats;
pub mod storage;
pub mod whitelist;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::{AppConfig, GatewayConfig, ServerConfig, StorageConfig};
pub use error::{Error, Result};
pub use format::{format_bytes, format_duration, format_percent};
pub use gateway::{ActivateReport, Gateway, InstallReport, Intercepted, PendingWrite, Source};
pub use host::{Deployment, Host};
pub use network::{HttpNetwork, Network};
pub use request::{CacheKey, Request, Response};
pub use stats::{GatewayStats, StatsSnapshot};
pub use storage::{CacheStorage, DiskStorage, MemoryStorage, Namespace};
pub use whitelist::StaticAssetWhitelist;
