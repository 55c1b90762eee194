use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{DEFAULT_PAGE_SIZE, ListPage, ObjectInfo, ObjectStore, StoreError, StoreFuture};

/// Object store backed by a local directory.
///
/// Each key maps to a file path relative to the root, with `/` as the
/// separator on every platform. Content types are not persisted.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
    page_size: usize,
}

impl DirStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.contains('\\') || key.ends_with('/') {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let rel = Path::new(key);
        for component in rel.components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StoreError::InvalidKey(key.to_string()));
            }
        }
        Ok(self.root.join(rel))
    }
}

/// Recursively collects all files under `current` as `/`-separated keys.
fn walk_dir(root: &Path, current: &Path, out: &mut Vec<ObjectInfo>) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(current) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, out)?;
        } else if metadata.is_file() {
            let rel = path.strip_prefix(root).map_err(std::io::Error::other)?;
            out.push(ObjectInfo {
                key: rel.to_string_lossy().replace('\\', "/"),
                size: metadata.len(),
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
    }

    Ok(())
}

/// Removes empty directories from `start` up to (not including) `root`.
fn prune_empty_parents(root: &Path, start: Option<&Path>) {
    let mut current = start;
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if std::fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

impl ObjectStore for DirStore {
    fn list_page<'a>(
        &'a self,
        prefix: &'a str,
        continuation: Option<&'a str>,
    ) -> StoreFuture<'a, ListPage> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        let continuation = continuation.map(str::to_string);
        let page_size = self.page_size;

        Box::pin(async move {
            let mut objects = tokio::task::spawn_blocking(move || {
                let mut all = Vec::new();
                walk_dir(&root, &root, &mut all)?;
                Ok::<_, std::io::Error>(all)
            })
            .await
            .map_err(|e| StoreError::Backend(format!("task join error: {e}")))??;

            objects.retain(|o| {
                o.key.starts_with(&prefix)
                    && continuation.as_deref().is_none_or(|token| o.key.as_str() > token)
            });
            objects.sort_by(|a, b| a.key.cmp(&b.key));

            let next = if objects.len() > page_size {
                objects.truncate(page_size);
                objects.last().map(|o| o.key.clone())
            } else {
                None
            };

            Ok(ListPage { objects, next })
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let path = self.key_path(key)?;
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StoreError::NotFound(key.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        data: Vec<u8>,
        content_type: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.key_path(key)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &data).await?;
            debug!(key, bytes = data.len(), content_type, "stored object");
            Ok(())
        })
    }

    fn delete_objects<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let mut deleted = 0;
            for key in keys {
                let path = self.key_path(key)?;
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        deleted += 1;
                        prune_empty_parents(&self.root, path.parent());
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(deleted)
        })
    }
}
