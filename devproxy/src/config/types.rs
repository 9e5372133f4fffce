use crate::config::endpoints::{LocalMount, RemoteOrigin};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Tunables that can come from a settings file or the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    // Root of the certificate cache (CA material and per-domain certificates)
    #[serde(deserialize_with = "cache_dir_or_default", default = "default_cache_dir")]
    pub cache_dir: String,
    // Program used to issue locally-trusted certificates
    #[serde(deserialize_with = "ca_program_or_default", default = "default_ca_program")]
    pub ca_program: String,
    #[serde(deserialize_with = "timeout_or_default", default = "default_timeout_secs")]
    pub provision_timeout_secs: u64,
    #[serde(deserialize_with = "timeout_or_default", default = "default_timeout_secs")]
    pub upstream_timeout_secs: u64,
    // Address the listener binds to; the port comes from the local URL
    #[serde(deserialize_with = "bind_address_or_default", default = "default_bind_address")]
    pub bind_address: String,
}

/// Everything the server needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub remote: RemoteOrigin,
    pub local: LocalMount,
    pub settings: Settings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            ca_program: default_ca_program(),
            provision_timeout_secs: default_timeout_secs(),
            upstream_timeout_secs: default_timeout_secs(),
            bind_address: default_bind_address(),
        }
    }
}

impl Settings {
    pub fn get_cache_dir(&self) -> PathBuf {
        PathBuf::from(&self.cache_dir)
    }

    pub fn get_provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs.max(1))
    }

    pub fn get_upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs.max(1))
    }

    pub fn get_bind_address(&self) -> Option<IpAddr> {
        self.bind_address.trim().parse().ok()
    }
}

impl ProxyConfig {
    pub fn new(remote: RemoteOrigin, local: LocalMount, settings: Settings) -> Self {
        Self { remote, local, settings }
    }

    /// Whether redirects from the remote can be mapped back by swapping only scheme and host.
    pub fn prefixes_correspond(&self) -> bool {
        self.local.path() == self.remote.path()
    }
}

impl Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?;
        writeln!(f, "{}", json)
    }
}

// Helper functions for deserialization. A value of the wrong type falls back to the
// field's default rather than failing the whole file.
fn string_or<'de, D>(deserializer: D, fallback: fn() -> String) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match String::deserialize(deserializer) {
        Ok(s) => Ok(s),
        Err(e) => {
            let value = fallback();
            warn!("Failed to deserialize string value: {}, using default '{}'", e, value);
            Ok(value)
        }
    }
}

fn cache_dir_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    string_or(deserializer, default_cache_dir)
}

fn ca_program_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    string_or(deserializer, default_ca_program)
}

fn bind_address_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    string_or(deserializer, default_bind_address)
}

fn timeout_or_default<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match u64::deserialize(deserializer) {
        Ok(n) => Ok(n),
        Err(e) => {
            let value = default_timeout_secs();
            warn!("Failed to deserialize timeout value: {}, using default {}s", e, value);
            Ok(value)
        }
    }
}

fn default_cache_dir() -> String {
    dirs::home_dir()
        .map(|home| home.join(".data").join("devproxy"))
        .unwrap_or_else(|| PathBuf::from("./.devproxy"))
        .to_string_lossy()
        .into_owned()
}

fn default_ca_program() -> String {
    "mkcert".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
