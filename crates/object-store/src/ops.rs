//! Store-agnostic helpers: full listing, chunked deletion, prefix clearing.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::{ObjectInfo, ObjectStore, StoreError};

/// Lists every object under `prefix`, following continuation tokens.
pub async fn list_all(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<Vec<ObjectInfo>, StoreError> {
    let mut objects = Vec::new();
    let mut continuation: Option<String> = None;

    loop {
        let page = store.list_page(prefix, continuation.as_deref()).await?;
        objects.extend(page.objects);
        match page.next {
            Some(next) => continuation = Some(next),
            None => break,
        }
    }

    Ok(objects)
}

/// Deletes `keys` in chunks no larger than the store's per-call limit.
///
/// Chunks are sent sequentially. Returns the summed deleted count.
pub async fn delete_batch(store: &dyn ObjectStore, keys: &[String]) -> Result<usize, StoreError> {
    if keys.is_empty() {
        return Ok(0);
    }

    let limit = store.max_delete_batch().max(1);
    let mut deleted = 0;
    for chunk in keys.chunks(limit) {
        let count = store.delete_objects(chunk).await?;
        debug!(requested = chunk.len(), deleted = count, "delete batch");
        deleted += count;
    }

    Ok(deleted)
}

/// Deletes every object under `prefix` and returns how many were deleted.
///
/// An empty prefix clears the whole store.
pub async fn delete_prefix(store: &dyn ObjectStore, prefix: &str) -> Result<usize, StoreError> {
    let keys: Vec<String> = list_all(store, prefix)
        .await?
        .into_iter()
        .map(|o| o.key)
        .collect();

    if keys.is_empty() {
        info!(prefix, "no objects to delete");
        return Ok(0);
    }

    let deleted = delete_batch(store, &keys).await?;
    info!(prefix, deleted, "deleted objects");
    Ok(deleted)
}

/// Fetches an object, mapping "not found" to `None`.
pub async fn get_optional(
    store: &dyn ObjectStore,
    key: &str,
) -> Result<Option<Vec<u8>>, StoreError> {
    match store.get(key).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Returns the distinct first path segments of all keys, sorted.
///
/// Keys without a `/` (root-level files) are not directories and are skipped.
pub async fn list_top_level_dirs(store: &dyn ObjectStore) -> Result<Vec<String>, StoreError> {
    let dirs: BTreeSet<String> = list_all(store, "")
        .await?
        .into_iter()
        .filter_map(|o| o.key.split_once('/').map(|(dir, _)| dir.to_string()))
        .filter(|dir| !dir.is_empty())
        .collect();
    Ok(dirs.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn seeded(keys: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for key in keys {
            store.insert(*key, b"x".to_vec());
        }
        store
    }

    #[tokio::test]
    async fn list_all_follows_pages() {
        let store = MemoryStore::new().with_page_size(3);
        for i in 0..10 {
            store.insert(format!("game/{i:02}.js"), vec![i as u8]);
        }
        store.insert("other/a.js", b"a".to_vec());

        let objects = list_all(&store, "game/").await.unwrap();
        assert_eq!(objects.len(), 10);
        assert_eq!(objects[0].key, "game/00.js");
        assert_eq!(objects[9].key, "game/09.js");
    }

    #[tokio::test]
    async fn delete_batch_chunks_at_store_limit() {
        let store = MemoryStore::new().with_delete_limit(1000);
        let keys: Vec<String> = (0..1200).map(|i| format!("g/{i:04}")).collect();
        for key in &keys {
            store.insert(key.clone(), Vec::new());
        }

        let deleted = delete_batch(&store, &keys).await.unwrap();
        assert_eq!(deleted, 1200);
        assert_eq!(store.delete_calls(), vec![1000, 200]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_batch_empty_is_noop() {
        let store = MemoryStore::new();
        assert_eq!(delete_batch(&store, &[]).await.unwrap(), 0);
        assert!(store.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn delete_prefix_only_touches_prefix() {
        let store = seeded(&["event-b/index.html", "event-b/js/app.js", "event-bb/x", "root.txt"]);
        let deleted = delete_prefix(&store, "event-b/").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.keys(), vec!["event-bb/x", "root.txt"]);
    }

    #[tokio::test]
    async fn get_optional_maps_not_found() {
        let store = seeded(&["a/version.txt"]);
        assert!(get_optional(&store, "a/version.txt").await.unwrap().is_some());
        assert!(get_optional(&store, "b/version.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn top_level_dirs_are_distinct_and_sorted() {
        let store = seeded(&["b/1", "a/1", "a/2/3", "version.txt"]);
        let dirs = list_top_level_dirs(&store).await.unwrap();
        assert_eq!(dirs, vec!["a", "b"]);
    }
}
