//! Error types shared by every part of the proxy

use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad command line input or settings file. Reported with usage text.
    #[error("{0}")]
    Configuration(String),

    /// Request path falls outside the local mount.
    #[error("Path '{path}' is not under the mount '{mount}'")]
    PathMapping { path: String, mount: String },

    #[error("Could not provision a certificate for '{domain}': {reason}")]
    CertificateProvisioning { domain: String, reason: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Upstream request to {target} failed: {source}")]
    Upstream {
        target: String,
        #[source]
        source: hyper::Error,
    },

    #[error("Upstream did not respond within {0} seconds")]
    UpstreamTimeout(u64),

    #[error("TLS error: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Server error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn provisioning(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CertificateProvisioning { domain: domain.into(), reason: reason.into() }
    }

    /// True for errors caused by user input, which warrant showing usage text.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}
