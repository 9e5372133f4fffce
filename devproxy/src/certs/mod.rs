// Certificates module
//
// - authority: The external certificate authority that issues locally-trusted certificates
// - store: The on-disk certificate cache and the readiness gate run before an HTTPS bind

pub mod authority;
pub mod store;

pub use authority::{CertificateAuthority, Mkcert};
pub use store::{CertificateArtifact, CertificateStore};
