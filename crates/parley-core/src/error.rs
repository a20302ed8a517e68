use thiserror::Error;

use crate::store::StoreError;

/// Failures surfaced by registry operations.
///
/// Verification and duplicate errors carry user-facing messages and abort the
/// operation without mutating the store. Icon and silent-refresh failures
/// never appear here; they degrade inside their own layers.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{url} is already registered")]
    DuplicateServer { url: String },

    #[error("{url} does not appear to be a valid Parley server ({detail})")]
    InvalidServer { url: String, detail: String },

    #[error("{url} is reachable but hosts no organizations")]
    NoOrganizations { url: String },

    #[error("{url} presented a certificate this machine does not trust")]
    CertificateTrustRequired { url: String },

    #[error("the certificate for {url} was not accepted")]
    UntrustedCertificate { url: String },

    #[error("no organization at position {index} (collection holds {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("settings store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
