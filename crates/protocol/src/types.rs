use serde::{Deserialize, Serialize};

/// Terminal status of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "partial_success")]
    PartialSuccess,
    #[serde(rename = "failed")]
    Failed,
}

impl DeployStatus {
    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error recorded against a single artifact of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactError {
    pub artifact: String,
    pub error: String,
}

/// Lifecycle of one artifact inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "downloading")]
    Downloading,
    #[serde(rename = "extracting")]
    Extracting,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "failed")]
    Failed,
}

impl JobStatus {
    /// Returns true once the job can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true while the job is actively doing work.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Downloading | Self::Extracting | Self::Uploading)
    }
}

/// Phase of the run reported in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    #[serde(rename = "starting")]
    Starting,
    #[serde(rename = "clearing")]
    Clearing,
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "finalizing")]
    Finalizing,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

/// Per-artifact part of a progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProgress {
    pub artifact: String,
    pub status: JobStatus,
    pub uploaded: usize,
    pub total: usize,
    /// Percentage of this artifact's entries that have been processed (0-100).
    pub percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_entry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Self-contained snapshot of a run's progress.
///
/// Each event carries the full per-artifact state, so consumers never
/// need to apply deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    /// Overall run percentage (0-100). Never decreases within a run.
    pub percentage: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactProgress>,
}

/// Advisory warning for an artifact older than what is currently deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionWarning {
    pub game_name: String,
    pub artifact_key: String,
    pub artifact_version: String,
    pub deployed_version: String,
}

/// Options used by a run, as persisted in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOptionsRecord {
    pub clear_before: bool,
    pub extract_zip: bool,
    #[serde(default)]
    pub custom_prefix: String,
}

/// One entry of the deployment history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Version label of the deploying system at the time of the run.
    pub version: String,
    /// RFC 3339 timestamp of the end of the run.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deployment_id: String,
    pub artifact_keys: Vec<String>,
    pub artifacts_count: usize,
    pub files_deployed: usize,
    pub status: DeployStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ArtifactError>,
    #[serde(default)]
    pub is_rollback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    pub options: DeploymentOptionsRecord,
}
