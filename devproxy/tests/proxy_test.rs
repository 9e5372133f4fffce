use devproxy::certs::CertificateAuthority;
use devproxy::config::{LocalMount, ProxyConfig, RemoteOrigin, Settings};
use devproxy::proxy::{ProxyHandler, http_server};
use devproxy::{Error, server};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Client, Request, Response, StatusCode, header};
use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{self, pki_types::ServerName};

/// Start an upstream that echoes what it received, plus a couple of redirect endpoints.
fn start_upstream() -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let make_svc = make_service_fn(move |_| async move {
        Ok::<_, Infallible>(service_fn(move |req: Request<Body>| async move {
            let path = req.uri().path_and_query().map(|p| p.as_str().to_string()).unwrap_or_default();
            let response = match req.uri().path() {
                "/base/redirect-same" => Response::builder()
                    .status(StatusCode::FOUND)
                    .header(header::LOCATION, format!("http://{}/base/done?ok=1", addr))
                    .body(Body::empty())
                    .unwrap(),
                "/base/redirect-foreign" => Response::builder()
                    .status(StatusCode::FOUND)
                    .header(header::LOCATION, "https://elsewhere.example/login?next=%2F")
                    .body(Body::empty())
                    .unwrap(),
                _ => {
                    let host = req.headers().get(header::HOST).and_then(|v| v.to_str().ok()).unwrap_or("-").to_string();
                    let origin = req.headers().get(header::ORIGIN).and_then(|v| v.to_str().ok()).unwrap_or("-").to_string();
                    Response::new(Body::from(format!("path={} host={} origin={}", path, host, origin)))
                }
            };
            Ok::<_, Infallible>(response)
        }))
    });

    listener.set_nonblocking(true).unwrap();
    let server = hyper::Server::from_tcp(listener).unwrap().serve(make_svc).with_graceful_shutdown(async {
        rx.await.ok();
    });
    tokio::spawn(server);
    (addr, tx)
}

/// Start an upstream that accepts connections and never answers.
async fn start_silent_upstream() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

/// Start the proxy on an ephemeral port and return its address.
fn start_proxy(remote: &str, local: &str) -> (SocketAddr, oneshot::Sender<()>) {
    start_proxy_with(remote, local, Settings::default())
}

fn start_proxy_with(remote: &str, local: &str, settings: Settings) -> (SocketAddr, oneshot::Sender<()>) {
    let config = ProxyConfig::new(RemoteOrigin::parse(remote).unwrap(), LocalMount::parse(local).unwrap(), settings);
    let listener = http_server::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handler = Arc::new(ProxyHandler::new(config));
    tokio::spawn(http_server::serve(listener, handler, async {
        rx.await.ok();
    }));
    (addr, tx)
}

async fn get(url: String, origin: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().uri(url);
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    Client::new().request(builder.body(Body::empty()).unwrap()).await.unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_forwards_path_query_and_headers() {
    let (upstream, _upstream_stop) = start_upstream();
    let (proxy, _proxy_stop) = start_proxy(&format!("http://{}/base/", upstream), "http://localhost:8080/base/");

    let response = get(format!("http://{}/base/hello/world?x=1&y=2", proxy), Some("http://localhost:8080")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert_eq!(body, format!("path=/base/hello/world?x=1&y=2 host={} origin=http://{}", upstream, upstream));
}

#[tokio::test]
async fn test_origin_not_added_when_absent() {
    let (upstream, _upstream_stop) = start_upstream();
    let (proxy, _proxy_stop) = start_proxy(&format!("http://{}/base/", upstream), "http://localhost:8080/base/");

    let body = body_text(get(format!("http://{}/base/", proxy), None).await).await;
    assert!(body.ends_with("origin=-"), "unexpected body: {}", body);
}

#[tokio::test]
async fn test_same_origin_redirect_is_mapped_locally() {
    let (upstream, _upstream_stop) = start_upstream();
    let (proxy, _proxy_stop) = start_proxy(&format!("http://{}/base/", upstream), "http://localhost:8080/base/");

    let response = get(format!("http://{}/base/redirect-same", proxy), None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "http://localhost:8080/base/done?ok=1");
}

#[tokio::test]
async fn test_foreign_redirect_is_untouched() {
    let (upstream, _upstream_stop) = start_upstream();
    let (proxy, _proxy_stop) = start_proxy(&format!("http://{}/base/", upstream), "http://localhost:8080/base/");

    let response = get(format!("http://{}/base/redirect-foreign", proxy), None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "https://elsewhere.example/login?next=%2F");
}

#[tokio::test]
async fn test_redirect_left_alone_when_prefixes_differ() {
    let (upstream, _upstream_stop) = start_upstream();
    let (proxy, _proxy_stop) = start_proxy(&format!("http://{}/base/", upstream), "http://localhost:8080/");

    let response = get(format!("http://{}/redirect-same", proxy), None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get(header::LOCATION).unwrap().to_str().unwrap(), format!("http://{}/base/done?ok=1", upstream));
}

#[tokio::test]
async fn test_path_outside_mount_is_not_found() {
    let (upstream, _upstream_stop) = start_upstream();
    let (proxy, _proxy_stop) = start_proxy(&format!("http://{}/base/", upstream), "http://localhost:8080/base/");

    let response = get(format!("http://{}/other/page", proxy), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dead_upstream_is_bad_gateway() {
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let (proxy, _proxy_stop) = start_proxy(&format!("http://{}/", dead), "http://localhost:8080/");

    let response = get(format!("http://{}/anything", proxy), None).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_silent_upstream_is_gateway_timeout() {
    let upstream = start_silent_upstream().await;
    let settings = Settings { upstream_timeout_secs: 1, ..Settings::default() };
    let (proxy, _proxy_stop) = start_proxy_with(&format!("http://{}/", upstream), "http://localhost:8080/", settings);

    let started = std::time::Instant::now();
    let response = get(format!("http://{}/slow", proxy), None).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
}

struct RefusingAuthority;

impl CertificateAuthority for RefusingAuthority {
    async fn issue(&self, domain: &str, _out_dir: &Path, _ca_root: &Path) -> devproxy::Result<()> {
        Err(Error::provisioning(domain, "refused"))
    }
}

#[tokio::test]
async fn test_https_provisioning_failure_binds_nothing() {
    let cache = tempfile::tempdir().unwrap();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let settings = Settings { cache_dir: cache.path().to_string_lossy().into_owned(), bind_address: "127.0.0.1".to_string(), ..Settings::default() };
    let config = ProxyConfig::new(
        RemoteOrigin::parse("https://example.com").unwrap(),
        LocalMount::parse(&format!("https://localhost:{}/", port)).unwrap(),
        settings,
    );

    let err = server::run_with(config, &RefusingAuthority, std::future::pending()).await.unwrap_err();
    assert!(matches!(err, Error::CertificateProvisioning { .. }));
    assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
}

#[tokio::test]
async fn test_invalid_bind_address_is_configuration_error() {
    let settings = Settings { bind_address: "not-an-ip".to_string(), ..Settings::default() };
    let config = ProxyConfig::new(RemoteOrigin::parse("https://example.com").unwrap(), LocalMount::parse("http://localhost:0/").unwrap(), settings);

    let err = server::run_with(config, &RefusingAuthority, std::future::pending()).await.unwrap_err();
    assert!(err.is_configuration());
}

/// Issues a self-signed certificate with rcgen and counts how often it was asked to.
#[derive(Default)]
struct SelfSignedAuthority {
    calls: AtomicUsize,
}

impl CertificateAuthority for SelfSignedAuthority {
    async fn issue(&self, domain: &str, out_dir: &Path, _ca_root: &Path) -> devproxy::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let cert = rcgen::generate_simple_self_signed(vec![domain.to_string()]).map_err(|e| Error::provisioning(domain, e.to_string()))?;
        let cert_pem = cert.serialize_pem().map_err(|e| Error::provisioning(domain, e.to_string()))?;
        std::fs::write(out_dir.join(format!("{}.pem", domain)), cert_pem)?;
        std::fs::write(out_dir.join(format!("{}-key.pem", domain)), cert.serialize_private_key_pem())?;
        Ok(())
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// TLS client that trusts only the certificate at `cert_path`.
fn tls_connector(cert_path: &Path) -> TlsConnector {
    let pem = std::fs::read(cert_path).unwrap();
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        roots.add(cert.unwrap()).unwrap();
    }
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// GET `path` over TLS from the proxy on `port`, retrying the connect until the listener is up.
async fn https_get(port: u16, cert_path: &Path, path: &str) -> (StatusCode, String) {
    let mut attempts = 0;
    let tcp = loop {
        match tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
            Ok(tcp) => break tcp,
            Err(_) if attempts < 100 => {
                attempts += 1;
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            Err(e) => panic!("proxy never started listening: {}", e),
        }
    };
    let server_name = ServerName::try_from("localhost").unwrap();
    let tls = tls_connector(cert_path).connect(server_name, tcp).await.unwrap();

    let (mut sender, connection) = hyper::client::conn::handshake(tls).await.unwrap();
    tokio::spawn(connection);
    let request = Request::builder().uri(path).header(header::HOST, format!("localhost:{}", port)).body(Body::empty()).unwrap();
    let response = sender.send_request(request).await.unwrap();
    let status = response.status();
    (status, body_text(response).await)
}

/// Run the HTTPS proxy until one request has gone through it.
async fn serve_one_https_request(config: ProxyConfig, authority: &SelfSignedAuthority, cert_path: &Path) -> (StatusCode, String) {
    let port = config.local.port();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = server::run_with(config, authority, async {
        stopped.await.ok();
    });
    let client = async {
        let result = https_get(port, cert_path, "/base/secure?a=b").await;
        stop.send(()).ok();
        result
    };
    let (served, result) = tokio::join!(server, client);
    served.unwrap();
    result
}

#[tokio::test]
async fn test_https_provisions_once_then_reuses_certificate() {
    let (upstream, _upstream_stop) = start_upstream();
    let cache = tempfile::tempdir().unwrap();
    let settings = Settings { cache_dir: cache.path().to_string_lossy().into_owned(), bind_address: "127.0.0.1".to_string(), ..Settings::default() };
    let cert_path = cache.path().join("certs").join("localhost").join("localhost.pem");

    let config = |port: u16| {
        ProxyConfig::new(
            RemoteOrigin::parse(&format!("http://{}/base/", upstream)).unwrap(),
            LocalMount::parse(&format!("https://localhost:{}/base/", port)).unwrap(),
            settings.clone(),
        )
    };

    let first = SelfSignedAuthority::default();
    let (status, body) = serve_one_https_request(config(free_port()), &first, &cert_path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!("path=/base/secure?a=b host={} origin=-", upstream));
    assert_eq!(first.calls.load(Ordering::SeqCst), 1);
    assert!(cert_path.is_file());

    let second = SelfSignedAuthority::default();
    let (status, _) = serve_one_https_request(config(free_port()), &second, &cert_path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second.calls.load(Ordering::SeqCst), 0);
}
