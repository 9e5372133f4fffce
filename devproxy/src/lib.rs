//! Serve a remote web application from a local URL.
//!
//! Requests under the local mount are forwarded to a single remote origin with
//! their path, `Host` and `Origin` rewritten; redirects back to the remote are
//! mapped into local space. HTTPS listeners get a locally-trusted certificate
//! from the certificate cache, provisioned on first use.

pub mod certs;
pub mod config;
pub mod error;
pub mod proxy;
pub mod server;
pub mod utils;

pub use error::{Error, Result};
