//! Pipeline tuning and per-run options.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wds_protocol::{DeployRequest, DeploymentOptionsRecord};

use crate::paths::DEFAULT_MARKER;

/// Tuning for the deployment pipeline. Fixed for the lifetime of an
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent uploads within one archive.
    pub upload_concurrency: usize,
    /// Artifacts processed at the same time.
    pub max_parallel_artifacts: usize,
    /// Capacity of the progress event channel.
    pub progress_buffer: usize,
    /// How long deployed versions are cached, in seconds.
    pub version_cache_ttl_secs: u64,
    /// Token separating the game name from the version in file names.
    pub marker_token: String,
    /// Name of the per-game file holding the deployed version.
    pub version_file: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_concurrency: 20,
            max_parallel_artifacts: 5,
            progress_buffer: 256,
            version_cache_ttl_secs: 60,
            marker_token: DEFAULT_MARKER.into(),
            version_file: "version.txt".into(),
        }
    }
}

impl PipelineConfig {
    /// Returns a copy with every bound raised to at least 1.
    pub fn normalized(mut self) -> Self {
        self.upload_concurrency = self.upload_concurrency.max(1);
        self.max_parallel_artifacts = self.max_parallel_artifacts.max(1);
        self.progress_buffer = self.progress_buffer.max(1);
        if self.marker_token.trim().is_empty() {
            self.marker_token = DEFAULT_MARKER.into();
        }
        self
    }

    pub fn version_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.version_cache_ttl_secs)
    }
}

/// Options for a single deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentOptions {
    /// Delete the target prefixes before uploading. Default `true`.
    pub clear_before_deploy: bool,
    /// Expand `.zip` artifacts instead of uploading them as-is. Default `true`.
    pub extract_archives: bool,
    /// Overrides the per-game target directory when non-empty.
    pub custom_prefix: String,
    /// Marks the run as a rollback in the history. No effect on the pipeline.
    pub is_rollback: bool,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            clear_before_deploy: true,
            extract_archives: true,
            custom_prefix: String::new(),
            is_rollback: false,
        }
    }
}

impl From<&DeployRequest> for DeploymentOptions {
    fn from(req: &DeployRequest) -> Self {
        Self {
            clear_before_deploy: req.clear_before,
            extract_archives: req.extract_zip,
            custom_prefix: req.custom_prefix.clone(),
            is_rollback: req.is_rollback,
        }
    }
}

impl DeploymentOptions {
    pub fn to_record(&self) -> DeploymentOptionsRecord {
        DeploymentOptionsRecord {
            clear_before: self.clear_before_deploy,
            extract_zip: self.extract_archives,
            custom_prefix: self.custom_prefix.clone(),
        }
    }
}
