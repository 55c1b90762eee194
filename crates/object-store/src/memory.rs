use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::{
    DEFAULT_DELETE_BATCH, DEFAULT_PAGE_SIZE, ListPage, OCTET_STREAM, ObjectInfo, ObjectStore,
    StoreError, StoreFuture,
};

/// An object held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

/// In-memory object store backed by an ordered map.
///
/// Listing is lexicographic by key, which matches S3 list ordering.
/// Delete calls larger than the configured limit are rejected, so callers
/// must chunk exactly as they would against a real provider.
#[derive(Debug)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    page_size: usize,
    delete_limit: usize,
    delete_calls: Mutex<Vec<usize>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with default page size and delete limit.
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            delete_limit: DEFAULT_DELETE_BATCH,
            delete_calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the number of objects returned per list page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the per-call delete limit.
    pub fn with_delete_limit(mut self, limit: usize) -> Self {
        self.delete_limit = limit.max(1);
        self
    }

    /// Inserts an object synchronously with the generic content type.
    pub fn insert(&self, key: impl Into<String>, data: Vec<u8>) {
        self.insert_typed(key, data, OCTET_STREAM);
    }

    /// Inserts an object synchronously with an explicit content type.
    pub fn insert_typed(&self, key: impl Into<String>, data: Vec<u8>, content_type: &str) {
        let mut objects = self.objects.lock().unwrap();
        objects.insert(
            key.into(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
    }

    /// Returns a copy of a stored object.
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Returns all keys in order.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the size of every delete call made so far.
    pub fn delete_calls(&self) -> Vec<usize> {
        self.delete_calls.lock().unwrap().clone()
    }

    fn page(&self, prefix: &str, continuation: Option<&str>) -> ListPage {
        let objects = self.objects.lock().unwrap();
        let start = match continuation {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(prefix),
        };

        let mut page: Vec<ObjectInfo> = objects
            .range::<str, _>((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(self.page_size + 1)
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                size: obj.data.len() as u64,
                last_modified: Some(obj.last_modified),
            })
            .collect();

        let next = if page.len() > self.page_size {
            page.truncate(self.page_size);
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        ListPage {
            objects: page,
            next,
        }
    }
}

impl ObjectStore for MemoryStore {
    fn list_page<'a>(
        &'a self,
        prefix: &'a str,
        continuation: Option<&'a str>,
    ) -> StoreFuture<'a, ListPage> {
        Box::pin(async move { Ok(self.page(prefix, continuation)) })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .map(|o| o.data.clone())
                .ok_or_else(|| StoreError::NotFound(key.to_string()))
        })
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        data: Vec<u8>,
        content_type: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if key.is_empty() {
                return Err(StoreError::InvalidKey(key.to_string()));
            }
            self.insert_typed(key, data, content_type);
            Ok(())
        })
    }

    fn delete_objects<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            if keys.len() > self.delete_limit {
                return Err(StoreError::BatchTooLarge {
                    size: keys.len(),
                    limit: self.delete_limit,
                });
            }
            self.delete_calls.lock().unwrap().push(keys.len());

            let mut objects = self.objects.lock().unwrap();
            let deleted = keys.iter().filter(|k| objects.remove(*k).is_some()).count();
            Ok(deleted)
        })
    }

    fn max_delete_batch(&self) -> usize {
        self.delete_limit
    }
}
