use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, ControlPlaneError>;

/// Failures on the bootstrap and join paths.
///
/// Every variant is fatal for the workflow that produced it. Cloud metadata
/// probe failures never show up here; the detector swallows them.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("store instance failed to start: {0}")]
    StoreStartup(String),

    #[error("failed to connect to store at {endpoint}: {source}")]
    StoreConnect {
        endpoint: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to determine local host identity: {0}")]
    HostIdentity(String),

    #[error("cluster discovery failed: {0}")]
    Discovery(String),

    #[error("membership change rejected: {0}")]
    Membership(#[source] StoreError),

    #[error("registry operation failed for key {key}: {source}")]
    Persistence {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("missing certificate {0}")]
    MissingCertificate(String),

    #[error("certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("status server failed: {0}")]
    Status(#[source] std::io::Error),
}

impl ControlPlaneError {
    pub(crate) fn persistence(key: impl Into<String>, source: StoreError) -> Self {
        Self::Persistence {
            key: key.into(),
            source,
        }
    }
}
