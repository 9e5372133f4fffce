use crate::certs::CertificateArtifact;
use crate::error::{Error, Result};
use crate::proxy::request_handler::ProxyHandler;
use hyper::service::service_fn;
use hyper::{Body, Request};
use log::{debug, info, warn};
use std::convert::Infallible;
use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::net::{IpAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::TcpListenerStream;

/// Build a TLS server configuration from the PEM certificate chain and private key.
pub fn load_tls_config(artifact: &CertificateArtifact) -> Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(&artifact.cert_path)?)).collect::<std::result::Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(Error::Tls(rustls::Error::General(format!("no certificates found in {}", artifact.cert_path.display()))));
    }
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(&artifact.key_path)?))?
        .ok_or_else(|| Error::Tls(rustls::Error::General(format!("no private key found in {}", artifact.key_path.display()))))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider).with_safe_default_protocol_versions()?.with_no_client_auth().with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Serve HTTPS on an already-bound listener until `shutdown` resolves.
pub async fn serve(listener: StdTcpListener, tls_config: Arc<ServerConfig>, handler: Arc<ProxyHandler>, shutdown: impl Future<Output = ()>) -> Result<()> {
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(listener)?;
    let acceptor = TlsAcceptor::from(tls_config);
    let mut incoming = TcpListenerStream::new(listener);

    info!("HTTPS Server running on https://{}", addr);

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                break;
            }
            next = incoming.next() => {
                match next {
                    Some(Ok(stream)) => {
                        let client_ip = stream.peer_addr().map(|a| a.ip()).unwrap_or(IpAddr::from([127, 0, 0, 1]));
                        let acceptor = acceptor.clone();
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            let tls = match acceptor.accept(stream).await {
                                Ok(tls) => tls,
                                Err(e) => {
                                    debug!("TLS handshake with {} failed: {}", client_ip, e);
                                    return;
                                }
                            };
                            let service = service_fn(move |req: Request<Body>| {
                                let handler = handler.clone();
                                async move { Ok::<_, Infallible>(handler.serve(client_ip, req).await) }
                            });
                            let mut http = hyper::server::conn::Http::new();
                            http.http1_only(true);
                            http.http1_keep_alive(true);
                            let conn = http.serve_connection(tls, service).with_upgrades();
                            if let Err(e) = conn.await {
                                debug!("HTTPS connection error from {}: {}", client_ip, e);
                            }
                        });
                    }
                    Some(Err(e)) => {
                        warn!("TLS incoming error: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    }
                    None => {
                        warn!("TLS incoming stream ended");
                        break;
                    }
                }
            }
        }
    }
    info!("HTTPS Server on {} stopped", addr);
    Ok(())
}
