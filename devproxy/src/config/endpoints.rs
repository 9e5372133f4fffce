use crate::error::{Error, Result};
use crate::utils::validation::is_empty_or_whitespace;
use std::fmt::Display;
use url::{Host, Origin, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn parse(scheme: &str) -> Result<Self> {
        match scheme {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(Error::configuration(format!("Unexpected scheme: {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The upstream every request is forwarded to.
#[derive(Debug, Clone)]
pub struct RemoteOrigin {
    url: Url,
}

impl RemoteOrigin {
    /// Parse the remote URL. It must be absolute; a schemeless input is rejected
    /// with a suggestion instead of guessing.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if is_empty_or_whitespace(input) {
            return Err(Error::configuration("The remote URL must not be empty"));
        }
        let schemeless = || {
            Error::configuration(format!(
                "The remote URL must be a full URL including the scheme, e.g. \"https://{}\"",
                input.trim_start_matches('/')
            ))
        };
        // "example.com:8080" parses with "example.com" as the scheme
        if !input.contains("://") {
            return Err(schemeless());
        }
        let url = Url::parse(input).map_err(|e| Error::configuration(format!("Invalid remote URL '{}': {}", input, e)))?;
        Scheme::parse(url.scheme())?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::configuration(format!("The remote URL '{}' has no host", input)));
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        // checked in parse
        if self.url.scheme() == "http" { Scheme::Http } else { Scheme::Https }
    }

    pub fn origin(&self) -> Origin {
        self.url.origin()
    }

    /// Value for the `Host` header: host plus the port when it isn't the scheme default.
    pub fn host_header(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Value for the `Origin` header, e.g. `https://example.com`.
    pub fn origin_header(&self) -> String {
        self.origin().ascii_serialization()
    }

    /// Base path every forwarded path is joined onto.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }
}

impl Display for RemoteOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// The local URL the remote application is served from.
#[derive(Debug, Clone)]
pub struct LocalMount {
    url: Url,
    scheme: Scheme,
    explicit_port: Option<u16>,
}

impl LocalMount {
    /// Accepted forms:
    /// - a path starting with a slash (`/`, `/api/`), served from `https://localhost`
    /// - a host and path without a scheme (`domain.test/path/`), served over HTTPS
    /// - a full `http://` or `https://` URL
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if is_empty_or_whitespace(input) {
            return Err(Error::configuration("The local URL must not be empty"));
        }
        let mut raw = input.to_string();
        if raw.starts_with('/') {
            raw = format!("localhost{}", raw);
        }
        if !raw.contains("://") {
            raw = format!("https://{}", raw);
        }
        let mut url = Url::parse(&raw).map_err(|e| Error::configuration(format!("Invalid local URL '{}': {}", input, e)))?;
        let scheme = Scheme::parse(url.scheme())?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::configuration(format!("The local URL '{}' has no host", input)));
        }
        // The certificate cache names files after the host, which an IPv6 literal cannot be
        if scheme == Scheme::Https && matches!(url.host(), Some(Host::Ipv6(_))) {
            return Err(Error::configuration(format!(
                "The local URL '{}' uses an IPv6 address; HTTPS needs a host name or IPv4 address (use http:// to serve on IPv6)",
                input
            )));
        }
        if url.path().is_empty() {
            url.set_path("/");
        }
        url.set_query(None);
        url.set_fragment(None);
        let explicit_port = explicit_port(&raw, &url);
        Ok(Self { url, scheme, explicit_port })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn domain(&self) -> &str {
        self.url.host_str().unwrap_or("localhost")
    }

    /// Port the user typed, even when it equals the scheme default.
    pub fn explicit_port(&self) -> Option<u16> {
        self.explicit_port
    }

    /// Port to listen on: the explicit one, otherwise 80 for HTTP and 443 for HTTPS.
    pub fn port(&self) -> u16 {
        self.explicit_port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Mount path prefix, never empty.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn origin(&self) -> Origin {
        self.url.origin()
    }

    pub fn is_localhost(&self) -> bool {
        self.domain() == "localhost"
    }
}

impl Display for LocalMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

// `Url::port` hides a port equal to the scheme default, so look at what was typed.
fn explicit_port(raw: &str, url: &Url) -> Option<u16> {
    if let Some(port) = url.port() {
        return Some(port);
    }
    let after_scheme = raw.split_once("://").map(|(_, rest)| rest).unwrap_or(raw);
    let authority = after_scheme.split(['/', '?', '#']).next().unwrap_or_default();
    let (_, port) = authority.rsplit_once(':')?;
    if authority.ends_with(']') {
        // bare IPv6 literal without a port
        return None;
    }
    port.parse().ok()
}
