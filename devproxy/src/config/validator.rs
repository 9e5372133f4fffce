use crate::config::endpoints::Scheme;
use crate::config::types::ProxyConfig;
use crate::error::{Error, Result};
use crate::utils::validation::{colliding_default_port, is_empty_or_whitespace, validate_certificate_domain};
use log::warn;

impl ProxyConfig {
    /// Reject configurations that can never serve, and return advisory warnings for the rest.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if self.settings.get_bind_address().is_none() {
            return Err(Error::configuration(format!("Invalid bind address: '{}'", self.settings.bind_address)));
        }

        if self.local.scheme() == Scheme::Https {
            validate_certificate_domain(self.local.domain()).map_err(Error::configuration)?;
            if is_empty_or_whitespace(&self.settings.ca_program) {
                return Err(Error::configuration("No certificate program configured for an HTTPS local URL"));
            }
            if is_empty_or_whitespace(&self.settings.cache_dir) {
                return Err(Error::configuration("No certificate cache directory configured for an HTTPS local URL"));
            }
        }

        #[allow(clippy::collapsible_if)]
        if let Some(port) = self.local.explicit_port() {
            if let Some(other) = colliding_default_port(self.local.scheme().as_str(), port) {
                warnings.push(format!(
                    "Serving {} on port {}, which is the default {} port; clients may try to speak {} to it",
                    self.local.scheme(),
                    port,
                    other,
                    other
                ));
            }
        }

        if !self.prefixes_correspond() {
            warnings.push(format!(
                "Local path '{}' differs from remote path '{}'; redirects from the remote will not be rewritten",
                self.local.path(),
                self.remote.path()
            ));
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
        Ok(warnings)
    }
}
