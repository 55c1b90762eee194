//! Deployment pipeline: move build artifacts into the web UI bucket.
//!
//! This crate implements the **business logic** for deploying versioned
//! build artifacts (zip archives and loose files) from a source object
//! store into a target object store. It has no UI or transport
//! dependencies; callers supply [`ObjectStore`](wds_object_store::ObjectStore)
//! implementations and consume progress events from a channel.
//!
//! # Pipeline
//!
//! 1. **Clear**: optionally delete the target prefixes the run will write
//! 2. **Download**: fetch each artifact from the source store
//! 3. **Extract**: expand archives, stripping a single wrapper directory
//! 4. **Upload**: bounded parallel upload under the computed target prefix
//! 5. **Record**: build the report and append it to the history
//!
//! Artifacts are processed in parallel under one bound, and the entries of
//! each archive are uploaded in parallel under a second, independent bound.

pub mod archive;
pub mod config;
pub mod deploy;
pub mod error;
pub mod history;
mod job;
pub mod paths;
pub mod progress;
pub mod types;
pub mod upload;
pub mod version_guard;

// Re-export primary types for convenience.
pub use config::{DeploymentOptions, PipelineConfig};
pub use deploy::DeployOrchestrator;
pub use error::{DeployError, HistoryError};
pub use history::{DeploymentHistory, JsonHistoryFile};
pub use progress::{ArtifactJob, ProgressTracker};
pub use types::{ArtifactDescriptor, DeploymentReport};
pub use version_guard::{
    ArtifactVersion, DeployedVersion, GameVersionHistory, VersionCache, VersionGuard,
};
pub use wds_protocol::{
    ArtifactError, ArtifactProgress, DeployStatus, JobStatus, ProgressEvent, ProgressPhase,
    VersionWarning,
};
