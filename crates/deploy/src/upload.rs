//! Bounded parallel upload of extracted entries.

use futures_util::StreamExt;
use futures_util::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wds_object_store::ObjectStore;

use crate::error::DeployError;

/// One object to write to the target store.
#[derive(Debug, Clone)]
pub struct UploadItem {
    /// Full destination key.
    pub key: String,
    /// Name reported in progress and errors.
    pub entry_name: String,
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Progress after one upload finished, successfully or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryProgress {
    pub entry_name: String,
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryError {
    pub entry: String,
    pub error: String,
}

/// Everything that happened during one [`upload_all`] call.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub uploaded_keys: Vec<String>,
    pub errors: Vec<EntryError>,
    /// Set when the item source failed; no further items were pulled.
    pub aborted: Option<DeployError>,
}

enum Task {
    Upload(UploadItem),
    Abort(DeployError),
}

enum Finished {
    Uploaded { key: String, entry_name: String },
    Failed { entry_name: String, error: DeployError },
    Aborted(DeployError),
}

async fn upload_one(
    store: &dyn ObjectStore,
    item: UploadItem,
    cancel: &CancellationToken,
) -> Finished {
    let UploadItem {
        key,
        entry_name,
        data,
        content_type,
    } = item;

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeployError::Cancelled),
        r = store.put(&key, data, &content_type) => r.map_err(DeployError::from),
    };

    match result {
        Ok(()) => Finished::Uploaded { key, entry_name },
        Err(error) => Finished::Failed { entry_name, error },
    }
}

fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (completed.min(total) * 100 / total) as u8
}

/// Uploads `items` with at most `concurrency` puts in flight.
///
/// Every item is attempted; one failed put does not stop the others. An
/// `Err` item stops pulling from `items`, lets in-flight puts finish and is
/// returned in [`UploadOutcome::aborted`]. `on_progress` runs after each
/// completed or failed put.
pub async fn upload_all<I, F>(
    items: I,
    total: usize,
    store: &dyn ObjectStore,
    concurrency: usize,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> UploadOutcome
where
    I: IntoIterator<Item = Result<UploadItem, DeployError>>,
    F: FnMut(EntryProgress),
{
    let mut source = items.into_iter();
    let mut halted = false;
    let tasks = std::iter::from_fn(move || {
        if halted {
            return None;
        }
        match source.next()? {
            Ok(item) => Some(Task::Upload(item)),
            Err(e) => {
                halted = true;
                Some(Task::Abort(e))
            }
        }
    });

    let mut results = stream::iter(tasks)
        .map(move |task| async move {
            match task {
                Task::Upload(item) => upload_one(store, item, cancel).await,
                Task::Abort(e) => Finished::Aborted(e),
            }
        })
        .buffer_unordered(concurrency.max(1));

    let mut outcome = UploadOutcome::default();
    let mut completed = 0;

    while let Some(finished) = results.next().await {
        let entry_name = match finished {
            Finished::Uploaded { key, entry_name } => {
                debug!(key = %key, "uploaded entry");
                outcome.uploaded_keys.push(key);
                entry_name
            }
            Finished::Failed { entry_name, error } => {
                warn!(entry = %entry_name, error = %error, "entry upload failed");
                outcome.errors.push(EntryError {
                    entry: entry_name.clone(),
                    error: error.to_string(),
                });
                entry_name
            }
            Finished::Aborted(e) => {
                warn!(error = %e, "entry source failed, no further entries pulled");
                outcome.aborted.get_or_insert(e);
                continue;
            }
        };

        completed += 1;
        on_progress(EntryProgress {
            entry_name,
            completed,
            total,
            percentage: percentage(completed, total),
        });
    }

    outcome
}
