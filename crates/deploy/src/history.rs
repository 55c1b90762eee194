//! Bounded, newest-first deployment history.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use wds_protocol::HistoryRecord;

use crate::error::HistoryError;

/// Number of records kept by default.
pub const DEFAULT_HISTORY_CAP: usize = 50;

pub type HistoryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HistoryError>> + Send + 'a>>;

/// Destination for finished-run records.
pub trait DeploymentHistory: Send + Sync {
    /// Appends one record. The newest record comes first.
    fn append(&self, record: HistoryRecord) -> HistoryFuture<'_>;
}

/// On-disk shape: `{ "version": ..., "deployments": [newest, ...] }`.
///
/// Unknown top-level fields are kept as they are.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HistoryDocument {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub deployments: Vec<HistoryRecord>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn read_document(path: &Path) -> Result<HistoryDocument, HistoryError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HistoryDocument::default()),
        Err(e) => Err(e.into()),
    }
}

/// Writes to a sibling temp file and renames it over `path`.
fn write_document(path: &Path, doc: &HistoryDocument) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// History kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonHistoryFile {
    path: PathBuf,
    cap: usize,
    version_label: String,
    lock: Arc<Mutex<()>>,
}

impl JsonHistoryFile {
    /// `version_label` is stamped on records that carry no version.
    pub fn new(path: impl Into<PathBuf>, version_label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cap: DEFAULT_HISTORY_CAP,
            version_label: version_label.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored records, newest first. A missing file is empty.
    pub async fn load(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_document(&path).map(|doc| doc.deployments))
            .await
            .map_err(|e| HistoryError::Join(e.to_string()))?
    }
}

impl DeploymentHistory for JsonHistoryFile {
    fn append(&self, mut record: HistoryRecord) -> HistoryFuture<'_> {
        let path = self.path.clone();
        let cap = self.cap;
        let label = self.version_label.clone();
        let lock = Arc::clone(&self.lock);

        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                let mut doc = read_document(&path)?;
                if record.version.is_empty() {
                    record.version = label.clone();
                }
                if doc.version.is_empty() {
                    doc.version = label;
                }
                doc.deployments.insert(0, record);
                doc.deployments.truncate(cap);
                write_document(&path, &doc)
            })
            .await
            .map_err(|e| HistoryError::Join(e.to_string()))?
        })
    }
}
