//! Startup: pick HTTP or HTTPS from the local URL, make sure a certificate exists
//! for HTTPS, then bind and serve.

use crate::certs::{CertificateAuthority, CertificateStore, Mkcert};
use crate::config::{ProxyConfig, Scheme};
use crate::error::{Error, Result};
use crate::proxy::{ProxyHandler, http_server, https_server};
use log::{debug, info};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Run until Ctrl-C, issuing certificates with the configured `mkcert`.
pub async fn run(config: ProxyConfig) -> Result<()> {
    let authority = Mkcert::new(config.settings.ca_program.clone());
    run_with(config, &authority, shutdown_signal()).await
}

/// Run with an explicit certificate authority and shutdown trigger.
///
/// For HTTPS the certificate gate completes before any socket is bound, so a
/// provisioning failure leaves nothing listening.
pub async fn run_with<A: CertificateAuthority>(config: ProxyConfig, authority: &A, shutdown: impl Future<Output = ()>) -> Result<()> {
    config.validate()?;
    let addr = listen_addr(&config)?;
    debug!("Resolved listen address {} for {}", addr, config.local);

    match config.local.scheme() {
        Scheme::Http => {
            let listener = http_server::bind(addr)?;
            let handler = Arc::new(ProxyHandler::new(config));
            http_server::serve(listener, handler, shutdown).await
        }
        Scheme::Https => {
            let store = CertificateStore::new(config.settings.get_cache_dir(), config.settings.get_provision_timeout());
            let artifact = store.ensure_certificate(config.local.domain(), authority).await?;
            let tls_config = https_server::load_tls_config(&artifact)?;
            let listener = http_server::bind(addr)?;
            let handler = Arc::new(ProxyHandler::new(config));
            https_server::serve(listener, tls_config, handler, shutdown).await
        }
    }
}

pub fn listen_addr(config: &ProxyConfig) -> Result<SocketAddr> {
    let ip = config
        .settings
        .get_bind_address()
        .ok_or_else(|| Error::configuration(format!("Invalid bind address: '{}'", config.settings.bind_address)))?;
    Ok(SocketAddr::new(ip, config.local.port()))
}

/// Human-readable description of the mapping, printed once at startup.
pub fn banner(config: &ProxyConfig) -> String {
    let mut text = format!(
        "Serving from remote URL:\n\n    \x1b[1;33m{}\x1b[0m\n\nTo local URL:\n\n    \x1b[1;32m{}\x1b[0m\n\n",
        config.remote, config.local
    );
    if !config.local.is_localhost() {
        text.push_str(&format!(
            "Make sure the following domain is in /etc/hosts before connecting:\n\n    \x1b[1;36m{}\x1b[0m\n\n",
            config.local.domain()
        ));
    }
    text
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C, shutting down");
    } else {
        // No signal handler available; serve until killed
        std::future::pending::<()>().await;
    }
}
