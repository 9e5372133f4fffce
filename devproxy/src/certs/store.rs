use crate::certs::authority::CertificateAuthority;
use crate::error::{Error, Result};
use crate::utils::validation::validate_certificate_domain;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A certificate and private key on disk, both PEM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateArtifact {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Per-user certificate cache.
///
/// ```text
/// <root>/root/                        CA material, owned by the authority
/// <root>/certs/<domain>/<domain>.pem
/// <root>/certs/<domain>/<domain>-key.pem
/// ```
///
/// Certificates are created on first use and never refreshed here; renewal is the
/// authority's business. Two processes provisioning the same domain at once are
/// not coordinated.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    root: PathBuf,
    timeout: Duration,
}

impl CertificateStore {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { root: root.into(), timeout }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ca_root(&self) -> PathBuf {
        self.root.join("root")
    }

    pub fn domain_dir(&self, domain: &str) -> PathBuf {
        self.root.join("certs").join(domain)
    }

    /// Where the pair for `domain` lives, whether or not it exists yet.
    pub fn artifact_for(&self, domain: &str) -> CertificateArtifact {
        let dir = self.domain_dir(domain);
        CertificateArtifact { cert_path: dir.join(format!("{}.pem", domain)), key_path: dir.join(format!("{}-key.pem", domain)) }
    }

    /// The cached pair for `domain`, if both files are present.
    pub fn lookup(&self, domain: &str) -> Option<CertificateArtifact> {
        let artifact = self.artifact_for(domain);
        if artifact.cert_path.is_file() && artifact.key_path.is_file() { Some(artifact) } else { None }
    }

    /// Return a usable certificate for `domain`, asking `authority` for one if the cache has none.
    ///
    /// Runs once before the HTTPS listener is bound. Any failure here is fatal for startup.
    pub async fn ensure_certificate<A: CertificateAuthority>(&self, domain: &str, authority: &A) -> Result<CertificateArtifact> {
        validate_certificate_domain(domain).map_err(|reason| Error::provisioning(domain, reason))?;

        if let Some(artifact) = self.lookup(domain) {
            debug!("Using cached certificate for {}: {}", domain, artifact.cert_path.display());
            return Ok(artifact);
        }

        let out_dir = self.domain_dir(domain);
        let ca_root = self.ca_root();
        info!("Could not find a certificate for {}, provisioning one in {}", domain, out_dir.display());

        for dir in [self.root.as_path(), ca_root.as_path(), out_dir.as_path()] {
            create_private_dir(dir, domain).await?;
        }

        match tokio::time::timeout(self.timeout, authority.issue(domain, &out_dir, &ca_root)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::provisioning(domain, format!("certificate authority did not finish within {} seconds", self.timeout.as_secs())));
            }
        }

        self.lookup(domain).ok_or_else(|| {
            let expected = self.artifact_for(domain);
            warn!("Certificate authority reported success but {} or {} is missing", expected.cert_path.display(), expected.key_path.display());
            Error::provisioning(domain, format!("expected {} and {} to exist", expected.cert_path.display(), expected.key_path.display()))
        })
    }
}

async fn create_private_dir(path: &Path, domain: &str) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o750);
    builder.create(path).await.map_err(|e| Error::provisioning(domain, format!("could not create {}: {}", path.display(), e)))
}
