//! Local workspace scanning.
//!
//! Walks the workspace with jwalk, pruning ignored directories before they are
//! read, then hashes the surviving files in parallel on the rayon pool.

use jwalk::{Parallelism, WalkDirGeneric};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::error::{Result, SyncError};
use crate::sync::exclude::IgnoreFilter;
use crate::sync::hash::hash_file;
use crate::sync::manifest::{FileInfo, Manifest, UnknownPaths};

/// Outcome of scanning the local workspace.
#[derive(Debug, Default)]
pub struct LocalScan {
    pub manifest: Manifest,
    /// Per-file failures, already formatted for `SyncResult::errors`
    pub errors: Vec<String>,
    /// Files that could not be described and directories that could not be
    /// listed. Sync leaves everything they cover alone.
    pub unknown: UnknownPaths,
}

/// Check that the workspace root exists and is a readable directory.
pub fn check_workspace(root: &Path) -> Result<()> {
    let workspace_error = |source: std::io::Error| SyncError::Workspace {
        path: root.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(root).map_err(workspace_error)?;
    if !metadata.is_dir() {
        return Err(workspace_error(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            "not a directory",
        )));
    }
    std::fs::read_dir(root).map_err(workspace_error)?;
    Ok(())
}

/// Build the local manifest. Blocking; run it on the blocking pool.
///
/// Only a missing or unreadable workspace root is an error; everything else
/// is collected into [`LocalScan::errors`].
pub fn scan_workspace(root: &Path, filter: &IgnoreFilter) -> Result<LocalScan> {
    check_workspace(root)?;

    let mut scan = LocalScan::default();
    let files = collect_files(root, filter, &mut scan);

    let described: Vec<(String, Result<FileInfo>)> = files
        .into_par_iter()
        .map(|(relative, absolute)| {
            let info = describe_file(&relative, &absolute);
            (relative, info)
        })
        .collect();

    for (relative, info) in described {
        match info {
            Ok(info) => {
                scan.manifest.insert(info);
            }
            Err(e) => {
                scan.errors.push(format!("{}: {}", relative, error_chain(&e)));
                scan.unknown.insert(relative);
            }
        }
    }

    Ok(scan)
}

/// Walk the tree and return `(relative, absolute)` for every non-ignored file.
fn collect_files(root: &Path, filter: &IgnoreFilter, scan: &mut LocalScan) -> Vec<(String, PathBuf)> {
    let prune_root = root.to_path_buf();
    let prune_filter = Arc::new(filter.clone());

    let walker = WalkDirGeneric::<((), ())>::new(root)
        .parallelism(Parallelism::RayonNewPool(0))
        .skip_hidden(false)
        .follow_links(false)
        .process_read_dir(move |_depth, _dir, _state, children| {
            for entry in children.iter_mut().flatten() {
                if !entry.file_type().is_dir() {
                    continue;
                }
                let pruned = relative_path(&prune_root, &entry.path())
                    .is_some_and(|rel| prune_filter.is_dir_ignored(&rel));
                if pruned {
                    entry.read_children_path = None;
                }
            }
        });

    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let location = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                scan.errors.push(format!("{}: {}", location, e));
                if let Some(relative) = e.path().and_then(|p| relative_path(root, p)) {
                    scan.unknown.insert(relative);
                }
                continue;
            }
        };

        if let Some(err) = &entry.read_children_error {
            let path = entry.path();
            match relative_path(root, &path) {
                Some(relative) => {
                    scan.errors.push(format!("{}/: {}", relative, err));
                    scan.unknown.insert(relative);
                }
                None => scan.errors.push(format!("{}: {}", path.display(), err)),
            }
            continue;
        }

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(relative) = relative_path(root, &path) else {
            scan.errors.push(format!("{}: file name is not valid UTF-8", path.display()));
            continue;
        };

        if filter.is_ignored(&relative) {
            continue;
        }

        files.push((relative, path));
    }

    files
}

/// `/`-separated path of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    let joined = parts?.join("/");
    (!joined.is_empty()).then_some(joined)
}

fn describe_file(relative: &str, absolute: &Path) -> Result<FileInfo> {
    let metadata = std::fs::metadata(absolute).map_err(|source| SyncError::Io {
        path: absolute.to_path_buf(),
        source,
    })?;

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let hash = hash_file(absolute)?;

    Ok(FileInfo::new(relative, metadata.len(), mtime, Some(hash)))
}

/// Render an error with its sources, `outer: inner: root`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
