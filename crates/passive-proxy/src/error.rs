//! Error types for the proxy.

use std::net::SocketAddr;

use thiserror::Error;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// CA certificate error.
    #[error("CA error: {0}")]
    Ca(#[from] CaError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Remote collector or completion-notice request failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid run settings.
    #[error(transparent)]
    Config(#[from] passive_core::CoreError),

    /// Proxy server error.
    #[error("Proxy error: {0}")]
    Proxy(String),
}

/// CA error type.
#[derive(Debug, Error)]
pub enum CaError {
    /// Key generation or certificate signing failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The leaf target is not a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to read CA material.
    #[error("Failed to read CA: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse CA material.
    #[error("Failed to parse CA: {0}")]
    Parse(String),

    /// Failed to write CA material.
    #[error("Failed to write CA: {0}")]
    Write(String),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
