use crate::error::{Error, Result};
use hyper::client::HttpConnector;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::http::Version;
use hyper::{Body, Client, Request, Response, StatusCode, upgrade};
use hyper_tls::HttpsConnector;
use log::{debug, error};
use std::net::IpAddr;
use std::time::Duration;

pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

// Headers that describe a single connection and must not be forwarded
const HOP_HEADERS: [&str; 8] = ["connection", "keep-alive", "proxy-authenticate", "proxy-authorization", "te", "trailers", "transfer-encoding", "upgrade"];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// HTTP/1.1 client able to reach both `http` and `https` origins.
pub fn build_client() -> UpstreamClient {
    let https = HttpsConnector::new();
    Client::builder().build::<_, Body>(https)
}

/// Check if the request is a WebSocket upgrade request
pub fn is_websocket(req: &Request<Body>) -> bool {
    let has_upgrade_ws =
        req.headers().get(header::UPGRADE).and_then(|v| v.to_str().ok()).map(|v| v.eq_ignore_ascii_case("websocket")).unwrap_or(false);
    let has_connection_upgrade =
        req.headers().get(header::CONNECTION).and_then(|v| v.to_str().ok()).map(|v| v.to_ascii_lowercase().contains("upgrade")).unwrap_or(false);
    has_upgrade_ws && has_connection_upgrade
}

/// Strip hop-by-hop headers, including any named by the `Connection` header itself.
pub fn remove_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_HEADERS {
        headers.remove(name);
    }
}

/// Append the client address to `X-Forwarded-For`.
pub fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, client_ip),
        None => client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Send an already-rewritten request upstream and return the upstream response.
///
/// The request URI must be absolute. WebSocket upgrades keep their `Upgrade` and
/// `Connection` headers and, on `101`, both sides are spliced together.
pub async fn forward(client: &UpstreamClient, client_ip: IpAddr, mut req: Request<Body>, timeout: Duration) -> Result<Response<Body>> {
    let target = req.uri().to_string();
    let websocket = is_websocket(&req);
    let client_upgrade = websocket.then(|| upgrade::on(&mut req));

    let upgrade_headers = if websocket {
        (req.headers().get(header::UPGRADE).cloned(), req.headers().get(header::CONNECTION).cloned())
    } else {
        (None, None)
    };
    remove_hop_headers(req.headers_mut());
    if let (Some(upgrade_value), Some(connection)) = upgrade_headers {
        req.headers_mut().insert(header::UPGRADE, upgrade_value);
        req.headers_mut().insert(header::CONNECTION, connection);
    }
    append_forwarded_for(req.headers_mut(), client_ip);
    *req.version_mut() = Version::HTTP_11;

    debug!("Upstream request: {} {}", req.method(), target);
    let mut response = match tokio::time::timeout(timeout, client.request(req)).await {
        Ok(Ok(response)) => response,
        Ok(Err(source)) => return Err(Error::Upstream { target, source }),
        Err(_) => return Err(Error::UpstreamTimeout(timeout.as_secs())),
    };

    if let Some(client_upgrade) = client_upgrade {
        if response.status() == StatusCode::SWITCHING_PROTOCOLS {
            let upstream_upgrade = upgrade::on(&mut response);
            tokio::spawn(async move {
                match tokio::try_join!(client_upgrade, upstream_upgrade) {
                    Ok((mut downstream, mut upstream)) => {
                        if let Err(e) = tokio::io::copy_bidirectional(&mut downstream, &mut upstream).await {
                            debug!("WebSocket tunnel to {} closed: {}", target, e);
                        }
                    }
                    Err(e) => error!("WebSocket upgrade for {} failed: {}", target, e),
                }
            });
            return Ok(response);
        }
    }

    remove_hop_headers(response.headers_mut());
    Ok(response)
}
