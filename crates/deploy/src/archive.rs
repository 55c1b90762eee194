//! Zip extraction with wrapper-directory stripping.
//!
//! Build archives are often zipped with a single top-level directory
//! (`event-b/index.html`, `event-b/js/app.js`). When every file shares one
//! first segment it is stripped, so the files land directly under the
//! target prefix.

use std::collections::VecDeque;
use std::io::{Cursor, Read};

use tracing::warn;
use zip::ZipArchive;

use crate::error::DeployError;

/// Generic content type for unknown extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Upper bound for the buffer reserved up front for one entry.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Returns the MIME type for a path based on its extension.
pub fn content_type_for(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or(path);
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return OCTET_STREAM,
    };

    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "map" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "zip" => "application/zip",
        _ => OCTET_STREAM,
    }
}

/// One extracted file, with its path relative to the stripped root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub data: Vec<u8>,
    pub content_type: &'static str,
}

/// Metadata of one archive entry, read without decompressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
}

/// Returns the shared first segment when every path has at least two
/// segments and all agree on the first one.
pub fn common_root<'a>(paths: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut root: Option<&str> = None;
    for path in paths {
        let (first, rest) = path.split_once('/')?;
        if first.is_empty() || rest.is_empty() {
            return None;
        }
        match root {
            None => root = Some(first),
            Some(r) if r == first => {}
            Some(_) => return None,
        }
    }
    root.map(str::to_string)
}

fn normalize_name(name: &str) -> String {
    name.replace('\\', "/")
}

/// Lazily decompressing iterator over the file entries of an archive.
///
/// Entry names are scanned once on open; each call to `next` decompresses
/// a single entry.
pub struct ArchiveEntries {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    pending: VecDeque<(usize, String)>,
    root: Option<String>,
}

impl std::fmt::Debug for ArchiveEntries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveEntries")
            .field("pending", &self.pending.len())
            .field("root", &self.root)
            .finish()
    }
}

/// Opens an archive for extraction.
pub fn extract(data: Vec<u8>) -> Result<ArchiveEntries, DeployError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut pending = VecDeque::with_capacity(archive.len());

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let name = normalize_name(entry.name());
        if entry.is_dir() || name.ends_with('/') {
            continue;
        }
        if entry.enclosed_name().is_none() {
            warn!(entry = %name, "skipping archive entry with unsafe path");
            continue;
        }
        pending.push_back((index, name.trim_start_matches("./").to_string()));
    }

    let root = common_root(pending.iter().map(|(_, name)| name.as_str()));
    Ok(ArchiveEntries {
        archive,
        pending,
        root,
    })
}

impl ArchiveEntries {
    /// The wrapper directory being stripped, if any.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    fn relative_path(&self, name: &str) -> String {
        match &self.root {
            Some(root) => name
                .strip_prefix(root.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(name)
                .to_string(),
            None => name.to_string(),
        }
    }

    fn read_entry(&mut self, index: usize, name: &str) -> Result<ArchiveEntry, DeployError> {
        let mut file = self.archive.by_index(index)?;
        let mut data = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
        file.read_to_end(&mut data)
            .map_err(|e| DeployError::Archive(format!("failed to read {name}: {e}")))?;
        drop(file);

        let path = self.relative_path(name);
        Ok(ArchiveEntry {
            content_type: content_type_for(&path),
            path,
            data,
        })
    }
}

impl Iterator for ArchiveEntries {
    type Item = Result<ArchiveEntry, DeployError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, name) = self.pending.pop_front()?;
        Some(self.read_entry(index, &name))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pending.len(), Some(self.pending.len()))
    }
}

impl ExactSizeIterator for ArchiveEntries {}

/// Lists entry metadata sorted by name, without extracting anything.
pub fn list_entries(data: &[u8]) -> Result<Vec<EntryInfo>, DeployError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        entries.push(EntryInfo {
            name: normalize_name(entry.name()),
            size: entry.size(),
            compressed_size: entry.compressed_size(),
            crc32: entry.crc32(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
