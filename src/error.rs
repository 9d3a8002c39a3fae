//! Error types for the agent status controller

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The local cache could not produce a usable object
    #[error("Failed to read {kind} {key} from cache: {message}")]
    CacheReadError {
        kind: String,
        key: String,
        message: String,
    },

    /// The status object changed between read and write
    #[error("Conflict updating status of {name}: the object has been modified")]
    Conflict { name: String },

    /// Every read-modify-write attempt hit a conflict
    #[error("Gave up updating status of {name} after {attempts} conflicting attempts")]
    RetriesExhausted { name: String, attempts: u32 },

    /// The status update did not finish in time
    #[error("Timed out after {seconds}s updating status of {name}")]
    Timeout { name: String, seconds: u64 },

    /// Invalid controller configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The hub kubeconfig could not be loaded
    #[error("Failed to load hub kubeconfig: {0}")]
    KubeconfigError(String),
}

impl Error {
    /// Whether the failure is expected to clear up on its own soon
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 409 || resp.code >= 500,
            Error::KubeError(_) => true,
            Error::Conflict { .. } | Error::RetriesExhausted { .. } | Error::Timeout { .. } => {
                true
            }
            Error::CacheReadError { .. } | Error::ConfigError(_) | Error::KubeconfigError(_) => {
                false
            }
        }
    }

    /// Short label used for the error counter
    pub fn metric_kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::CacheReadError { .. } => "cache_read",
            Error::Conflict { .. } => "conflict",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::Timeout { .. } => "timeout",
            Error::ConfigError(_) | Error::KubeconfigError(_) => "config",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
