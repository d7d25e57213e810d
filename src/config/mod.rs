//! Configuration types for the gateway, its storage, and the proxy server.

use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::Namespace;
use crate::whitelist::{DEFAULT_STATIC_EXTENSIONS, StaticAssetWhitelist};

/// Resources stored eagerly when a new version installs.
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/index.html",
    "/css/styles.css",
    "/js/app.js",
    "/manifest.json",
    "/pages/events.html",
    "/pages/map.html",
    "/pages/community.html",
    "https://fonts.googleapis.com/css2?family=Open+Sans:wght@400;600&family=Nunito:wght@400;600;700&display=swap",
];

/// Configuration for one deployed version of the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Cache name; combined with `version` to form the namespace.
    pub cache_name: String,
    /// Deployed version string.
    pub version: String,
    /// Origin that relative manifest paths and proxied requests resolve against.
    pub origin: String,
    /// Precache manifest, in install order.
    pub precache: Vec<String>,
    /// Extensions cached opportunistically on a miss.
    pub static_extensions: Vec<String>,
    /// Number of manifest entries fetched concurrently during install.
    pub install_concurrency: usize,
    /// Whether non-2xx responses for whitelisted assets are stored.
    pub cache_error_responses: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_name: "shoresquad".to_string(),
            version: "v1".to_string(),
            origin: "http://127.0.0.1:8080/".to_string(),
            precache: DEFAULT_PRECACHE.iter().map(ToString::to_string).collect(),
            static_extensions: DEFAULT_STATIC_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            install_concurrency: 4,
            cache_error_responses: true,
        }
    }
}

impl GatewayConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache name.
    #[must_use]
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Sets the deployed version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Replaces the precache manifest.
    #[must_use]
    pub fn with_precache<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the static-asset extensions.
    #[must_use]
    pub fn with_static_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the install fetch concurrency.
    #[must_use]
    pub fn with_install_concurrency(mut self, concurrency: usize) -> Self {
        self.install_concurrency = concurrency;
        self
    }

    /// Sets whether non-2xx whitelisted responses are stored.
    #[must_use]
    pub fn with_cache_error_responses(mut self, cache: bool) -> Self {
        self.cache_error_responses = cache;
        self
    }

    /// Returns the namespace this version reads and writes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNamespace`] if the name/version pair is not a
    /// usable storage name.
    pub fn namespace(&self) -> Result<Namespace> {
        Namespace::for_version(&self.cache_name, &self.version)
    }

    /// Builds the static-asset whitelist.
    #[must_use]
    pub fn whitelist(&self) -> StaticAssetWhitelist {
        StaticAssetWhitelist::new(&self.static_extensions)
    }

    /// Parses the origin URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the origin is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).map_err(|e| Error::InvalidUrl {
            url: self.origin.clone(),
            reason: e.to_string(),
        })
    }

    /// Resolves a manifest entry or request path against the origin.
    ///
    /// Absolute URLs are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the origin or the entry cannot be parsed.
    pub fn resolve(&self, entry: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(entry) {
            return Ok(url);
        }
        self.origin_url()?
            .join(entry)
            .map_err(|e| Error::InvalidUrl {
                url: entry.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Where durable cache namespaces live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; one subdirectory per namespace.
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    /// Uses `STATE_DIRECTORY` (set by systemd when `StateDirectory=` is configured),
    /// falling back to `$XDG_DATA_HOME/shoresquad-cache` for interactive use.
    fn default() -> Self {
        let dir = std::env::var("STATE_DIRECTORY").map_or_else(
            |_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("shoresquad-cache")
            },
            |state_dir| PathBuf::from(state_dir).join("cache"),
        );
        Self { dir }
    }
}

/// Local proxy server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Gateway version configuration.
    pub gateway: GatewayConfig,
    /// Durable storage location.
    pub storage: StorageConfig,
    /// Proxy server settings.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shoresquad-cache")
            .join("config.toml")
    }

    /// Parses configuration from TOML text. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid configuration.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads configuration from [`default_path`](Self::default_path) if it
    /// exists, otherwise returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }
}
