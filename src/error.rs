//! Error types for the shoresquad-cache library.

use thiserror::Error;

/// Errors that can occur across the gateway lifecycle.
#[derive(Error, Debug)]
pub enum Error {
    /// A precache manifest resource could not be retrieved during install.
    #[error("install failed fetching {url}: {reason}")]
    InstallFetch {
        /// Resolved URL of the manifest entry.
        url: String,
        /// Why the fetch was rejected.
        reason: String,
    },

    /// Listing namespaces in durable storage failed during activate.
    #[error("namespace enumeration failed: {0}")]
    NamespaceEnumeration(String),

    /// The network layer failed to produce a response.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Storing a response in the cache failed.
    #[error("cache write failed for {key}: {reason}")]
    CacheWrite {
        /// Cache key being written.
        key: String,
        /// Underlying failure.
        reason: String,
    },

    /// Generic storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Namespace identifier cannot be used as a storage name.
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),

    /// A request or manifest URL could not be parsed or resolved.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// No version has been activated yet.
    #[error("no active cache version")]
    NotActive,

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error during storage operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for shoresquad-cache operations.
pub type Result<T> = std::result::Result<T, Error>;
