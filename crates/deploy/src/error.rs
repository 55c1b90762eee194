//! Deploy error types.

use wds_object_store::StoreError;

use crate::types::DeploymentReport;

/// Errors produced during a deployment run.
///
/// Everything except [`DeployError::Aborted`] is recorded per artifact and
/// never escapes [`DeployOrchestrator::deploy`](crate::DeployOrchestrator::deploy).
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("failed to clear {prefix}: {source}")]
    Clear {
        prefix: String,
        #[source]
        source: StoreError,
    },

    /// The run could not proceed. Carries the `failed` report of the run.
    #[error("deployment aborted: {source}")]
    Aborted {
        report: Box<DeploymentReport>,
        #[source]
        source: Box<DeployError>,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("task join error: {0}")]
    Join(String),
}

impl From<zip::result::ZipError> for DeployError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

/// Errors produced while persisting deployment history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task join error: {0}")]
    Join(String),
}
