use crate::error::{Error, Result};
use log::{debug, info};
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Something that can issue a certificate and key for a domain into a directory.
///
/// On success both `<domain>.pem` and `<domain>-key.pem` are expected in `out_dir`.
/// `ca_root` is where the authority keeps its own root material.
pub trait CertificateAuthority {
    fn issue(&self, domain: &str, out_dir: &Path, ca_root: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Issues certificates by running `mkcert -install <domain>` inside the output directory.
#[derive(Debug, Clone)]
pub struct Mkcert {
    program: String,
}

impl Mkcert {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for Mkcert {
    fn default() -> Self {
        Self::new("mkcert")
    }
}

impl CertificateAuthority for Mkcert {
    async fn issue(&self, domain: &str, out_dir: &Path, ca_root: &Path) -> Result<()> {
        info!("Running: {} -install {}", self.program, domain);
        debug!("CAROOT={} cwd={}", ca_root.display(), out_dir.display());

        // CAROOT goes to the child only; the proxy's own environment is left alone
        let mut child = Command::new(&self.program)
            .arg("-install")
            .arg(domain)
            .current_dir(out_dir)
            .env("CAROOT", ca_root)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::provisioning(domain, format!("could not run '{}': {}", self.program, e)))?;

        let status = child.wait().await.map_err(|e| Error::provisioning(domain, format!("'{}' failed: {}", self.program, e)))?;
        if !status.success() {
            return Err(Error::provisioning(domain, format!("'{}' exited with {}", self.program, status)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_provisioning_error() {
        let dir = tempfile::tempdir().unwrap();
        let authority = Mkcert::new("devproxy-test-no-such-program");
        let err = authority.issue("localhost", dir.path(), dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::CertificateProvisioning { .. }));
        assert!(err.to_string().contains("devproxy-test-no-such-program"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program_is_provisioning_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Mkcert::new("false").issue("localhost", dir.path(), dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
