//! Wire types for the WDS deployment pipeline.
//!
//! These are the shapes exchanged with callers of the pipeline: the deploy
//! request (and its validation rules), the deploy response, progress
//! snapshots pushed while a run is in flight, version warnings and the
//! records appended to the deployment history.

pub mod messages;
pub mod types;

pub use messages::{
    DeployRequest, DeployResponse, ValidationError, VersionCheckRequest, VersionCheckResponse,
    format_duration,
};
pub use types::{
    ArtifactError, ArtifactProgress, DeployStatus, DeploymentOptionsRecord, HistoryRecord,
    JobStatus, ProgressEvent, ProgressPhase, VersionWarning,
};

/// Maximum number of artifacts accepted in one deploy request.
pub const MAX_ARTIFACTS_PER_REQUEST: usize = 100;

/// Maximum length of a single artifact key.
pub const MAX_ARTIFACT_KEY_LEN: usize = 1000;

/// Maximum length of a custom target prefix.
pub const MAX_PREFIX_LEN: usize = 200;
