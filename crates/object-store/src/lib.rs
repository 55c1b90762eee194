//! Object store contract consumed by the deployment pipeline.
//!
//! The pipeline treats both the source (build artifacts) and target
//! (web UI) buckets as key-value blob stores keyed by `/`-separated paths.
//! Backends implement [`ObjectStore`]; the free functions in [`ops`]
//! layer pagination and chunked deletion on top of it.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryStore`]: ordered in-memory map, used by tests and dry runs
//! - [`DirStore`]: a local directory where each key is a relative file path

mod dir;
mod error;
mod memory;
pub mod ops;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

pub use dir::DirStore;
pub use error::StoreError;
pub use memory::{MemoryStore, StoredObject};
pub use ops::{delete_batch, delete_prefix, get_optional, list_all, list_top_level_dirs};

/// Maximum number of keys a single delete call accepts (S3 `DeleteObjects` limit).
pub const DEFAULT_DELETE_BATCH: usize = 1000;

/// Default number of objects returned per list page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Fallback content type for objects without a known type.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Boxed future returned by [`ObjectStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Metadata for a stored object, as returned by list calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a list call.
///
/// `next` is the continuation token for the following page, `None` on the
/// last page.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    pub next: Option<String>,
}

/// Abstract blob store.
///
/// Implemented per backend. Using a trait keeps the pipeline decoupled from
/// any vendor SDK and testable with in-memory doubles.
pub trait ObjectStore: Send + Sync {
    /// Lists one page of objects whose key starts with `prefix`.
    fn list_page<'a>(
        &'a self,
        prefix: &'a str,
        continuation: Option<&'a str>,
    ) -> StoreFuture<'a, ListPage>;

    /// Fetches the full content of an object.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>>;

    /// Stores an object, replacing any existing one.
    fn put<'a>(&'a self, key: &'a str, data: Vec<u8>, content_type: &'a str)
    -> StoreFuture<'a, ()>;

    /// Deletes up to [`max_delete_batch`](Self::max_delete_batch) keys in
    /// one call and returns how many were deleted.
    fn delete_objects<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize>;

    /// Per-call limit for [`delete_objects`](Self::delete_objects).
    fn max_delete_batch(&self) -> usize {
        DEFAULT_DELETE_BATCH
    }
}
