use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::proxy::forwarder::{UpstreamClient, build_client, forward};
use crate::proxy::url_space::{remote_target, to_local, to_remote};
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Body, Request, Response, StatusCode, Uri};
use log::{debug, error, info, trace, warn};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

/// What happened to a response's `Location` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationRewrite {
    Absent,
    /// Not UTF-8 or not an absolute URL; left alone.
    Unrecognized,
    /// Points at some other origin; left alone.
    Foreign,
    /// Same origin, but the local and remote path prefixes differ. `reported` is true
    /// only for the first occurrence in this handler's lifetime.
    PrefixMismatch { reported: bool },
    Rewritten(String),
}

/// Rewrites requests into the remote URL space and redirects back into the local one.
pub struct ProxyHandler {
    config: ProxyConfig,
    client: UpstreamClient,
    upstream_timeout: Duration,
    mismatch_reported: AtomicBool,
}

impl ProxyHandler {
    pub fn new(config: ProxyConfig) -> Self {
        let upstream_timeout = config.settings.get_upstream_timeout();
        Self { config, client: build_client(), upstream_timeout, mismatch_reported: AtomicBool::new(false) }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Handle one request end to end. Failures become error responses; nothing escapes.
    pub async fn serve(&self, client_ip: IpAddr, req: Request<Body>) -> Response<Body> {
        match self.handle_request(client_ip, req).await {
            Ok(resp) => resp,
            Err(e) => {
                error!("handle_request error from {}: {}", client_ip, e);
                plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    pub async fn handle_request(&self, client_ip: IpAddr, mut req: Request<Body>) -> Result<Response<Body>> {
        let method = req.method().clone();
        let local_path = req.uri().path().to_string();

        match self.rewrite_request(&mut req) {
            Ok(()) => {}
            Err(Error::PathMapping { path, mount }) => {
                warn!("Received request from {ip} for {path} outside of mount {mount}", ip = client_ip, path = path, mount = mount);
                return Ok(plain_response(StatusCode::NOT_FOUND, "Not Found"));
            }
            Err(e) => return Err(e),
        }
        let target = req.uri().to_string();

        let mut response = match forward(&self.client, client_ip, req, self.upstream_timeout).await {
            Ok(response) => response,
            Err(Error::UpstreamTimeout(secs)) => {
                error!("HTTP proxy timeout for {path} -> {target} after {secs}s", path = local_path, target = target, secs = secs);
                return Ok(plain_response(StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout"));
            }
            Err(e) => {
                error!("HTTP proxy error for {path} -> {target}: {err}", path = local_path, target = target, err = e);
                return Ok(plain_response(StatusCode::BAD_GATEWAY, "Bad Gateway"));
            }
        };

        let rewrite = self.rewrite_location(response.headers_mut());
        if let LocationRewrite::Rewritten(location) = &rewrite {
            debug!("Rewrote Location to {}", location);
        }

        info!(
            "{ip} {method} {path} -> {target} {status}",
            ip = client_ip,
            method = method,
            path = local_path,
            target = target,
            status = response.status()
        );
        Ok(response)
    }

    /// Point the request at the remote: absolute URI, `Host`, and `Origin` when present.
    pub fn rewrite_request(&self, req: &mut Request<Body>) -> Result<()> {
        let remote = &self.config.remote;
        let remote_path = to_remote(req.uri().path(), self.config.local.path())?;
        let target = remote_target(remote, &remote_path, req.uri().query());
        trace!("Rewriting {} -> {}", req.uri(), target);
        *req.uri_mut() = target.parse::<Uri>().map_err(hyper::http::Error::from)?;

        let host = HeaderValue::from_str(&remote.host_header()).map_err(hyper::http::Error::from)?;
        req.headers_mut().insert(header::HOST, host);

        if req.headers().contains_key(header::ORIGIN) {
            let origin = HeaderValue::from_str(&remote.origin_header()).map_err(hyper::http::Error::from)?;
            req.headers_mut().insert(header::ORIGIN, origin);
        }
        Ok(())
    }

    /// Map a redirect into local space when it targets the remote origin.
    pub fn rewrite_location(&self, headers: &mut HeaderMap) -> LocationRewrite {
        let Some(value) = headers.get(header::LOCATION) else {
            return LocationRewrite::Absent;
        };
        let Some(location) = value.to_str().ok().and_then(|v| Url::parse(v).ok()) else {
            return LocationRewrite::Unrecognized;
        };
        if location.origin() != self.config.remote.origin() {
            return LocationRewrite::Foreign;
        }
        if !self.config.prefixes_correspond() {
            let reported = self.report_prefix_mismatch(&location);
            return LocationRewrite::PrefixMismatch { reported };
        }
        let Some(local_url) = to_local(&location, &self.config.remote, &self.config.local) else {
            return LocationRewrite::Foreign;
        };
        match HeaderValue::from_str(local_url.as_str()) {
            Ok(value) => {
                headers.insert(header::LOCATION, value);
                LocationRewrite::Rewritten(local_url.into())
            }
            Err(_) => LocationRewrite::Unrecognized,
        }
    }

    fn report_prefix_mismatch(&self, location: &Url) -> bool {
        let first = self.mismatch_reported.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok();
        if first {
            warn!(
                "Not rewriting redirect to {location}: local path '{local}' and remote path '{remote}' differ. \
                 Use the same path for both to have redirects mapped back. This is only reported once.",
                location = location,
                local = self.config.local.path(),
                remote = self.config.remote.path()
            );
        }
        first
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
