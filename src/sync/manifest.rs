//! Manifests and change detection.
//!
//! A manifest is the `{path, size, mtime, hash}` state of one side of a sync,
//! computed fresh for every operation.
//!
//! # Change rule
//!
//! A source file is transferred over its target counterpart when:
//! 1. the target has no file at that path, or
//! 2. both sides carry a content hash and the hashes differ, or
//! 3. at least one side has no content hash (composite multipart ETag, opaque
//!    provider ETag) and either the sizes differ or the source mtime is
//!    strictly newer than the target mtime.
//!
//! Hashes are authoritative whenever both exist; size+mtime is only the
//! fallback.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::sync::exclude::IgnoreFilter;
use crate::storage::RemoteObject;
use crate::sync::hash::is_content_etag;
use crate::sync::path::validate_relative_key;

/// State of one file on one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// Relative path, always `/`-separated
    pub path: String,
    pub size: u64,
    /// Modification time in epoch milliseconds, 0 when unknown
    pub mtime: i64,
    /// Hex MD5 of the content, when known
    pub hash: Option<String>,
}

impl FileInfo {
    pub fn new(path: impl Into<String>, size: u64, mtime: i64, hash: Option<String>) -> Self {
        Self {
            path: path.into(),
            size,
            mtime,
            hash,
        }
    }
}

/// Path-keyed set of [`FileInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    files: BTreeMap<String, FileInfo>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, normalizing its path separators. Returns the replaced entry.
    pub fn insert(&mut self, mut info: FileInfo) -> Option<FileInfo> {
        if info.path.contains('\\') {
            info.path = info.path.replace('\\', "/");
        }
        self.files.insert(info.path.clone(), info)
    }

    pub fn get(&self, path: &str) -> Option<&FileInfo> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FileInfo> {
        self.files.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Build the remote manifest from a listing under `prefix`.
    ///
    /// Keys that would escape the workspace are reported in the returned error
    /// list instead of being added. Ignored paths are dropped.
    pub fn from_remote(objects: Vec<RemoteObject>, prefix: &str, filter: &IgnoreFilter) -> (Self, Vec<String>) {
        let mut manifest = Self::new();
        let mut errors = Vec::new();

        for object in objects {
            let Some(relative) = relative_key(&object.key, prefix) else {
                continue;
            };

            if let Err(e) = validate_relative_key(relative) {
                errors.push(format!("{}: {}", object.key, e));
                continue;
            }

            if filter.is_ignored(relative) {
                continue;
            }

            let hash = object.etag.filter(|etag| is_content_etag(etag)).map(|etag| etag.to_ascii_lowercase());

            manifest.insert(FileInfo::new(
                relative,
                object.size,
                object.last_modified_ms.unwrap_or(0),
                hash,
            ));
        }

        (manifest, errors)
    }
}

impl FromIterator<FileInfo> for Manifest {
    fn from_iter<I: IntoIterator<Item = FileInfo>>(iter: I) -> Self {
        let mut manifest = Self::new();
        for info in iter {
            manifest.insert(info);
        }
        manifest
    }
}

/// Local paths whose state could not be read.
///
/// An entry covers the path itself and everything below it, so an unreadable
/// directory shields its whole subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownPaths {
    paths: HashSet<String>,
}

impl UnknownPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.paths.insert(path.trim_end_matches('/').to_string());
    }

    /// Whether `path` or one of its ancestor directories is unknown.
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
            || path
                .match_indices('/')
                .any(|(end, _)| self.paths.contains(&path[..end]))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for UnknownPaths {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut unknown = Self::new();
        for path in iter {
            unknown.insert(path);
        }
        unknown
    }
}

impl fmt::Display for UnknownPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<&str> = self.paths.iter().map(String::as_str).collect();
        paths.sort_unstable();
        f.write_str(&paths.join(", "))
    }
}

/// Full object key for a relative path.
pub fn object_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Relative path for a full object key, or `None` for keys outside the
/// prefix and for directory markers. A doubled separator after the prefix is
/// kept, so the result fails relative-key validation instead of aliasing
/// another key.
pub fn relative_key<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_matches('/');
    let relative = if prefix.is_empty() {
        key
    } else {
        key.strip_prefix(prefix)?.strip_prefix('/')?
    };
    (!relative.is_empty() && !relative.ends_with('/')).then_some(relative)
}

/// Decide whether `source` must be copied over `target`.
pub fn needs_transfer(source: &FileInfo, target: Option<&FileInfo>) -> bool {
    let Some(target) = target else {
        return true;
    };

    match (&source.hash, &target.hash) {
        (Some(a), Some(b)) => a != b,
        _ => source.size != target.size || source.mtime > target.mtime,
    }
}

/// Work computed by diffing two manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    /// Source files to copy to the target side, in path order
    pub transfers: Vec<FileInfo>,
    /// Target-only paths to delete, in path order
    pub deletions: Vec<String>,
    /// Files present and identical on both sides
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty() && self.deletions.is_empty()
    }

    pub fn transfer_bytes(&self) -> u64 {
        self.transfers.iter().map(|f| f.size).sum()
    }
}

/// Diff `source` against `target`.
///
/// Paths covered by `unknown` had their local state fail to load; they are
/// neither transferred nor deleted. Target-only files are scheduled for
/// deletion only when `delete_extras` is set.
pub fn diff(source: &Manifest, target: &Manifest, delete_extras: bool, unknown: &UnknownPaths) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for file in source.iter() {
        if unknown.contains(&file.path) {
            continue;
        }
        if needs_transfer(file, target.get(&file.path)) {
            plan.transfers.push(file.clone());
        } else {
            plan.unchanged += 1;
        }
    }

    if delete_extras {
        plan.deletions = target
            .paths()
            .filter(|path| !source.contains(path) && !unknown.contains(path))
            .map(str::to_string)
            .collect();
    }

    plan
}
