//! Mapping between the local path space under the mount and the remote URL space.
//!
//! A local path `<mount>/<rest>` corresponds to `<remote base path>/<rest>` on the
//! remote origin. Everything here is pure; no I/O.

use crate::config::{LocalMount, RemoteOrigin};
use crate::error::{Error, Result};
use crate::utils::path::{join_paths, normalize_path, strip_prefix_rooted};
use url::Url;

/// Path of `local_path` relative to `mount`, re-rooted at `/`.
/// Fails when the cleaned path lies outside the mount (including via `..`).
pub fn to_remote(local_path: &str, mount: &str) -> Result<String> {
    let mount = if mount.is_empty() { "/" } else { mount };
    let cleaned = normalize_path(local_path);
    strip_prefix_rooted(&cleaned, mount).ok_or_else(|| Error::PathMapping { path: local_path.to_string(), mount: mount.to_string() })
}

/// Local equivalent of an absolute remote URL, or None when it belongs to another
/// origin. Query and fragment are kept.
///
/// When the local mount and the remote base path are the same, only scheme, host and
/// port change and the path is kept as is, wherever it points on the remote. Otherwise
/// the path is re-rooted from the remote base onto the mount, and a path outside the
/// remote base has no local equivalent.
pub fn to_local(remote_url: &Url, remote: &RemoteOrigin, local: &LocalMount) -> Option<Url> {
    if remote_url.origin() != remote.origin() {
        return None;
    }
    let path = if local.path() == remote.path() {
        remote_url.path().to_string()
    } else {
        let rest = strip_prefix_rooted(remote_url.path(), remote.path())?;
        join_paths(local.path(), &rest)
    };
    let mut local_url = local.url().clone();
    local_url.set_path(&path);
    local_url.set_query(remote_url.query());
    local_url.set_fragment(remote_url.fragment());
    Some(local_url)
}

/// Absolute URL to forward to: the remote base path joined with `remote_path`,
/// with the remote's own query (if any) merged ahead of the request query.
pub fn remote_target(remote: &RemoteOrigin, remote_path: &str, query: Option<&str>) -> String {
    let path = join_paths(remote.path(), remote_path);
    let query = match (remote.query().filter(|q| !q.is_empty()), query.filter(|q| !q.is_empty())) {
        (Some(base), Some(extra)) => Some(format!("{}&{}", base, extra)),
        (Some(base), None) => Some(base.to_string()),
        (None, Some(extra)) => Some(extra.to_string()),
        (None, None) => None,
    };
    match query {
        Some(q) => format!("{}{}?{}", remote.origin_header(), path, q),
        None => format!("{}{}", remote.origin_header(), path),
    }
}
