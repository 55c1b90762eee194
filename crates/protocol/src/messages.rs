use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ArtifactError, DeployStatus, VersionWarning};
use crate::{MAX_ARTIFACT_KEY_LEN, MAX_ARTIFACTS_PER_REQUEST, MAX_PREFIX_LEN};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reasons a deploy request is rejected before it reaches the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("artifactKeys must be an array with 1-100 items (got {0})")]
    ArtifactCount(usize),

    #[error("artifact key is empty")]
    EmptyKey,

    #[error("artifact key too long: {0} characters")]
    KeyTooLong(usize),

    #[error("invalid artifact key format: {0}")]
    InvalidKey(String),

    #[error("target prefix too long: {0} characters")]
    PrefixTooLong(usize),

    #[error("invalid target prefix: {0}")]
    InvalidPrefix(String),
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.')
}

fn is_prefix_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-')
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Deploys a set of artifacts from the source store to the target store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub artifact_keys: Vec<String>,
    #[serde(default = "default_true")]
    pub clear_before: bool,
    #[serde(default = "default_true")]
    pub extract_zip: bool,
    #[serde(default, alias = "targetPrefix")]
    pub custom_prefix: String,
    #[serde(default)]
    pub is_rollback: bool,
}

impl DeployRequest {
    /// Creates a request with default options for the given keys.
    pub fn new(artifact_keys: Vec<String>) -> Self {
        Self {
            artifact_keys,
            clear_before: true,
            extract_zip: true,
            custom_prefix: String::new(),
            is_rollback: false,
        }
    }

    /// Checks key count, key character set and prefix shape.
    ///
    /// Keys and prefix are trimmed in place before checking.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        let count = self.artifact_keys.len();
        if count == 0 || count > MAX_ARTIFACTS_PER_REQUEST {
            return Err(ValidationError::ArtifactCount(count));
        }

        for key in &mut self.artifact_keys {
            let trimmed = key.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::EmptyKey);
            }
            if trimmed.len() > MAX_ARTIFACT_KEY_LEN {
                return Err(ValidationError::KeyTooLong(trimmed.len()));
            }
            if !trimmed.chars().all(is_key_char) {
                return Err(ValidationError::InvalidKey(trimmed.to_string()));
            }
            if trimmed.len() != key.len() {
                *key = trimmed.to_string();
            }
        }

        let prefix = self.custom_prefix.trim();
        if prefix.len() > MAX_PREFIX_LEN {
            return Err(ValidationError::PrefixTooLong(prefix.len()));
        }
        if !prefix.chars().all(is_prefix_char) {
            return Err(ValidationError::InvalidPrefix(prefix.to_string()));
        }
        if prefix.len() != self.custom_prefix.len() {
            self.custom_prefix = prefix.to_string();
        }

        Ok(())
    }
}

/// Asks for version warnings before deploying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCheckRequest {
    #[serde(default)]
    pub artifact_keys: Vec<String>,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Summary of a finished deployment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub success: bool,
    pub status: DeployStatus,
    pub total_files: usize,
    /// Human-readable duration, e.g. `"1m 5s"`.
    pub duration: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub deleted_count: usize,
    #[serde(default)]
    pub errors: Vec<ArtifactError>,
}

/// Version warnings for a candidate artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCheckResponse {
    pub warnings: Vec<VersionWarning>,
    pub has_warnings: bool,
}

impl From<Vec<VersionWarning>> for VersionCheckResponse {
    fn from(warnings: Vec<VersionWarning>) -> Self {
        let has_warnings = !warnings.is_empty();
        Self {
            warnings,
            has_warnings,
        }
    }
}

/// Formats a duration as `"{m}m {s}s"`, or `"{s}s"` under a minute.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let remaining = seconds % 60;
    if minutes > 0 {
        format!("{minutes}m {remaining}s")
    } else {
        format!("{seconds}s")
    }
}
