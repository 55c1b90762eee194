//! Artifact key parsing: game names, versions and target prefixes.
//!
//! Artifact file names follow `{game}-{marker}-{version}.zip`, for example
//! `20251003/event-b-prd-1.0.6.zip` is game `event-b` at version `1.0.6`.

use std::cmp::Ordering;

use crate::config::DeploymentOptions;
use crate::types::ArtifactDescriptor;

/// Marker token used when none is configured.
pub const DEFAULT_MARKER: &str = "prd";

/// Returns the last `/` segment of a key.
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Returns true when the key names a zip archive (case-insensitive).
pub fn is_archive(key: &str) -> bool {
    strip_zip_ext(key).len() != key.len()
}

fn strip_zip_ext(name: &str) -> &str {
    let split = name.len().saturating_sub(4);
    match (name.get(..split), name.get(split..)) {
        (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(".zip") => stem,
        _ => name,
    }
}

fn file_stem(key: &str) -> &str {
    strip_zip_ext(basename(key))
}

/// Parses the game name, or `None` when the marker is absent or leads the
/// file name.
pub fn parse_game_name(key: &str, marker: &str) -> Option<String> {
    let parts: Vec<&str> = file_stem(key).split('-').collect();
    let index = parts.iter().position(|p| *p == marker)?;
    (index > 0).then(|| parts[..index].join("-"))
}

/// Resolves the game name, falling back to the first `-` segment of the
/// file name when the marker is missing.
pub fn resolve_game_name(key: &str, marker: &str) -> String {
    if let Some(name) = parse_game_name(key, marker) {
        return name;
    }
    let stem = file_stem(key);
    match stem.split('-').next() {
        Some(first) if !first.is_empty() => first.to_string(),
        _ => stem.to_string(),
    }
}

/// Extracts the version following `-{marker}-` at the end of the file name.
///
/// Accepts one to three numeric dot-separated segments.
pub fn resolve_version(key: &str, marker: &str) -> Option<String> {
    let stem = file_stem(key);
    let needle = format!("-{marker}-");
    let start = stem.rfind(&needle)? + needle.len();
    let candidate = &stem[start..];
    is_version_literal(candidate).then(|| candidate.to_string())
}

fn is_version_literal(s: &str) -> bool {
    let segments: Vec<&str> = s.split('.').collect();
    (1..=3).contains(&segments.len())
        && segments
            .iter()
            .all(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()))
}

fn numeric_segments(version: &str) -> Vec<u64> {
    version
        .trim()
        .split('.')
        .map(|seg| seg.trim().parse().unwrap_or(0))
        .collect()
}

/// Compares dotted versions numerically. Missing or non-numeric segments
/// count as 0, so `1.2` equals `1.2.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = numeric_segments(a);
    let right = numeric_segments(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Like [`compare_versions`], with a missing version ordered first.
pub fn compare_optional_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_versions(a, b),
    }
}

/// Sorts items ascending by the version returned from `version_of`.
pub fn sort_versions<T, F>(items: &mut [T], version_of: F)
where
    F: Fn(&T) -> Option<&str>,
{
    items.sort_by(|a, b| compare_optional_versions(version_of(a), version_of(b)));
}

/// Normalizes a custom prefix: trims, drops leading `/` and ensures a
/// trailing `/`. Returns `None` when nothing is left.
pub fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        None
    } else if trimmed.ends_with('/') {
        Some(trimmed.to_string())
    } else {
        Some(format!("{trimmed}/"))
    }
}

/// Destination prefix for an artifact's objects.
pub fn target_prefix(descriptor: &ArtifactDescriptor, options: &DeploymentOptions) -> String {
    normalize_prefix(&options.custom_prefix)
        .unwrap_or_else(|| format!("{}/", descriptor.game_name))
}
