//! Data types for the deploy flow.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;
use wds_protocol::{ArtifactError, DeployResponse, DeployStatus, HistoryRecord, format_duration};

use crate::config::DeploymentOptions;
use crate::paths;

/// What the pipeline knows about one artifact key before touching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub key: String,
    pub game_name: String,
    pub version: Option<String>,
    pub is_archive: bool,
}

impl ArtifactDescriptor {
    pub fn from_key(key: &str, marker: &str) -> Self {
        Self {
            key: key.to_string(),
            game_name: paths::resolve_game_name(key, marker),
            version: paths::resolve_version(key, marker),
            is_archive: paths::is_archive(key),
        }
    }
}

/// Result of one deployment run.
#[derive(Debug, Clone)]
pub struct DeploymentReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    /// Artifact keys of the run, deduplicated, in request order.
    pub artifact_keys: Vec<String>,
    /// Objects written to the target store, counting partial artifacts.
    pub total_files: usize,
    pub deleted_count: usize,
    pub uploaded_keys: Vec<String>,
    pub errors: Vec<ArtifactError>,
    pub status: DeployStatus,
    pub options: DeploymentOptions,
}

impl DeploymentReport {
    pub fn is_success(&self) -> bool {
        self.status == DeployStatus::Success
    }

    pub fn to_response(&self) -> DeployResponse {
        DeployResponse {
            success: self.status != DeployStatus::Failed,
            status: self.status,
            total_files: self.total_files,
            duration: format_duration(self.duration),
            duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
            deleted_count: self.deleted_count,
            errors: self.errors.clone(),
        }
    }

    /// Builds the history entry for this run. The version label is left
    /// empty for the history store to fill in.
    pub fn to_history_record(&self, operator: Option<String>) -> HistoryRecord {
        HistoryRecord {
            version: String::new(),
            timestamp: self.finished_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            deployment_id: self.id.to_string(),
            artifact_keys: self.artifact_keys.clone(),
            artifacts_count: self.artifact_keys.len(),
            files_deployed: self.total_files,
            status: self.status,
            errors: self.errors.clone(),
            is_rollback: self.options.is_rollback,
            operator,
            options: self.options.to_record(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: DeployStatus) -> DeploymentReport {
        let now = Utc::now();
        DeploymentReport {
            id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            duration: Duration::from_millis(65_400),
            artifact_keys: vec!["20251003/event-b-prd-1.0.6.zip".into()],
            total_files: 12,
            deleted_count: 3,
            uploaded_keys: Vec::new(),
            errors: Vec::new(),
            status,
            options: DeploymentOptions::default(),
        }
    }

    #[test]
    fn descriptor_from_key() {
        let d = ArtifactDescriptor::from_key("20251003/event-b-prd-1.0.6.zip", "prd");
        assert_eq!(d.game_name, "event-b");
        assert_eq!(d.version.as_deref(), Some("1.0.6"));
        assert!(d.is_archive);

        let raw = ArtifactDescriptor::from_key("assets/logo.png", "prd");
        assert!(!raw.is_archive);
        assert!(raw.version.is_none());
    }

    #[test]
    fn response_formats_duration() {
        let resp = report(DeployStatus::Success).to_response();
        assert!(resp.success);
        assert_eq!(resp.duration, "1m 5s");
        assert_eq!(resp.duration_ms, 65_400);
        assert_eq!(resp.deleted_count, 3);
    }

    #[test]
    fn partial_success_still_reports_success() {
        assert!(report(DeployStatus::PartialSuccess).to_response().success);
        assert!(!report(DeployStatus::Failed).to_response().success);
    }

    #[test]
    fn history_record_carries_run_fields() {
        let mut r = report(DeployStatus::Success);
        r.options.is_rollback = true;
        let record = r.to_history_record(Some("ci-runner".into()));
        assert_eq!(record.deployment_id, r.id.to_string());
        assert_eq!(record.artifacts_count, 1);
        assert_eq!(record.files_deployed, 12);
        assert!(record.is_rollback);
        assert_eq!(record.operator.as_deref(), Some("ci-runner"));
        assert!(record.timestamp.ends_with('Z'));
    }
}
