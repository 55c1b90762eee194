//! One artifact's trip through download, extraction and upload.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wds_object_store::ObjectStore;
use wds_protocol::JobStatus;

use crate::archive;
use crate::error::DeployError;
use crate::paths;
use crate::progress::ProgressTracker;
use crate::types::ArtifactDescriptor;
use crate::upload::{EntryError, UploadItem, UploadOutcome, upload_all};

/// What one job produced. `error` is set when the artifact failed.
#[derive(Debug)]
pub(crate) struct JobOutcome {
    pub key: String,
    pub uploaded_keys: Vec<String>,
    pub error: Option<String>,
}

/// Everything a spawned job needs, owned so the task is `'static`.
pub(crate) struct JobContext {
    pub source: Arc<dyn ObjectStore>,
    pub target: Arc<dyn ObjectStore>,
    pub tracker: Arc<ProgressTracker>,
    pub permits: Arc<Semaphore>,
    pub cancel: CancellationToken,
    pub upload_concurrency: usize,
    pub prefix: String,
    pub extract: bool,
}

impl JobContext {
    pub(crate) async fn run(self, descriptor: ArtifactDescriptor) -> JobOutcome {
        let key = descriptor.key.clone();

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        };

        let (uploaded_keys, result) = match permit {
            Some(_permit) => self.execute(&descriptor).await,
            None => (Vec::new(), Err(DeployError::Cancelled)),
        };

        match result {
            Ok(()) => {
                self.tracker.update(&key, |job| {
                    job.status = JobStatus::Done;
                    job.current_entry = None;
                });
                info!(artifact = %key, files = uploaded_keys.len(), "artifact deployed");
                JobOutcome {
                    key,
                    uploaded_keys,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!(artifact = %key, error = %message, "artifact failed");
                self.tracker.update(&key, |job| {
                    job.status = JobStatus::Failed;
                    job.current_entry = None;
                    job.error = Some(message.clone());
                });
                JobOutcome {
                    key,
                    uploaded_keys,
                    error: Some(message),
                }
            }
        }
    }

    async fn execute(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> (Vec<String>, Result<(), DeployError>) {
        let key = descriptor.key.as_str();
        if self.cancel.is_cancelled() {
            return (Vec::new(), Err(DeployError::Cancelled));
        }

        self.tracker.update(key, |job| job.status = JobStatus::Downloading);
        let downloaded = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DeployError::Cancelled),
            r = self.source.get(key) => r.map_err(DeployError::from),
        };
        let data = match downloaded {
            Ok(data) => data,
            Err(e) => return (Vec::new(), Err(e)),
        };
        info!(artifact = %key, bytes = data.len(), "downloaded artifact");

        if descriptor.is_archive && self.extract {
            self.upload_archive(key, data).await
        } else {
            self.upload_raw(key, data).await
        }
    }

    async fn upload_archive(
        &self,
        key: &str,
        data: Vec<u8>,
    ) -> (Vec<String>, Result<(), DeployError>) {
        self.tracker.update(key, |job| job.status = JobStatus::Extracting);
        let entries = match archive::extract(data) {
            Ok(entries) => entries,
            Err(e) => return (Vec::new(), Err(e)),
        };

        let total = entries.len();
        info!(artifact = %key, entries = total, root = ?entries.root(), "extracted archive");
        self.tracker.update(key, |job| {
            job.status = JobStatus::Uploading;
            job.total_count = total;
        });

        let prefix = self.prefix.as_str();
        let items = entries.map(|entry| {
            entry.map(|e| UploadItem {
                key: format!("{prefix}{}", e.path),
                entry_name: e.path,
                data: e.data,
                content_type: e.content_type.to_string(),
            })
        });

        let outcome = self.upload(key, items, total).await;
        self.settle(outcome, total)
    }

    async fn upload_raw(&self, key: &str, data: Vec<u8>) -> (Vec<String>, Result<(), DeployError>) {
        self.tracker.update(key, |job| {
            job.status = JobStatus::Uploading;
            job.total_count = 1;
        });

        let name = paths::basename(key);
        let item = UploadItem {
            key: format!("{}{name}", self.prefix),
            entry_name: name.to_string(),
            data,
            content_type: archive::content_type_for(name).to_string(),
        };

        let outcome = self.upload(key, std::iter::once(Ok(item)), 1).await;
        self.settle(outcome, 1)
    }

    async fn upload<I>(&self, key: &str, items: I, total: usize) -> UploadOutcome
    where
        I: IntoIterator<Item = Result<UploadItem, DeployError>>,
    {
        let tracker = &self.tracker;
        upload_all(
            items,
            total,
            &*self.target,
            self.upload_concurrency,
            &self.cancel,
            |progress| {
                tracker.update(key, |job| {
                    job.uploaded_count = progress.completed;
                    job.current_entry = Some(progress.entry_name);
                });
            },
        )
        .await
    }

    fn settle(
        &self,
        outcome: UploadOutcome,
        total: usize,
    ) -> (Vec<String>, Result<(), DeployError>) {
        let UploadOutcome {
            uploaded_keys,
            errors,
            aborted,
        } = outcome;

        let result = if let Some(e) = aborted {
            Err(e)
        } else if errors.is_empty() {
            Ok(())
        } else if self.cancel.is_cancelled() {
            Err(DeployError::Cancelled)
        } else {
            Err(DeployError::Upload(summarize(&errors, total)))
        };
        (uploaded_keys, result)
    }
}

fn summarize(errors: &[EntryError], total: usize) -> String {
    match errors.first() {
        Some(first) if errors.len() == 1 => {
            format!("1 of {total} entries failed: {}: {}", first.entry, first.error)
        }
        Some(first) => format!(
            "{} of {total} entries failed, first: {}: {}",
            errors.len(),
            first.entry,
            first.error
        ),
        None => String::new(),
    }
}
