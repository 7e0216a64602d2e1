//! Ignore rules for sync operations.
//!
//! Supports .gitignore-style patterns: built-in defaults, caller supplied
//! patterns and an optional `.syncignore` file at the workspace root.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Name of the per-workspace ignore file.
pub const IGNORE_FILE_NAME: &str = ".syncignore";

/// Patterns that are always excluded from sync.
pub const DEFAULT_IGNORES: &[&str] = &[
    // OS metadata
    ".DS_Store",
    "Thumbs.db",
    // Editor swap and backup files
    "*.swp",
    "*.swo",
    "*~",
    // Dependencies and build output
    "node_modules/",
    "__pycache__/",
    "*.pyc",
    ".gradle/",
    "build/",
    "dist/",
    "target/",
    // IDE
    ".idea/",
    ".vscode/",
    "*.iml",
    // Logs and temp files
    "*.log",
    "logs/",
    "*.tmp",
    "*.temp",
    ".cache/",
    IGNORE_FILE_NAME,
];

/// Merged, append-only set of ignore patterns.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    root: PathBuf,
    patterns: Vec<String>,
    matcher: Gitignore,
    workspace_loaded: bool,
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl IgnoreFilter {
    /// Create a filter holding only the built-in defaults.
    pub fn with_defaults() -> Self {
        let root = PathBuf::from(".");
        let patterns: Vec<String> = DEFAULT_IGNORES.iter().map(|p| p.to_string()).collect();
        // The defaults are static and known to parse.
        let matcher = build_matcher(&root, &patterns).unwrap_or_else(|_| Gitignore::empty());

        Self {
            root,
            patterns,
            matcher,
            workspace_loaded: false,
        }
    }

    /// Append patterns to the set. Blank lines and `#` comments are skipped.
    ///
    /// On error the filter is left unchanged.
    pub fn add_patterns<I, S>(&mut self, patterns: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut merged = self.patterns.clone();
        let mut added = 0;

        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            if merged.iter().any(|p| p == pattern) {
                continue;
            }
            merged.push(pattern.to_string());
            added += 1;
        }

        if added > 0 {
            self.matcher = build_matcher(&self.root, &merged)?;
            self.patterns = merged;
        }

        Ok(added)
    }

    /// Merge patterns from `<dir>/.syncignore` if it exists.
    ///
    /// Idempotent: only the first call reads the file. A missing file leaves
    /// the defaults in place. Returns the number of patterns added.
    pub fn load_from_workspace(&mut self, dir: &Path) -> Result<usize> {
        if self.workspace_loaded {
            return Ok(0);
        }
        self.workspace_loaded = true;

        let path = dir.join(IGNORE_FILE_NAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(SyncError::Io { path, source }),
        };

        self.add_patterns(content.lines())
    }

    /// Check whether a workspace-relative file path is excluded.
    ///
    /// Backslashes are treated as separators, and a path is excluded when
    /// any of its parent directories is.
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        self.matches(relative_path, false)
    }

    /// Check whether a workspace-relative directory is excluded.
    pub fn is_dir_ignored(&self, relative_path: &str) -> bool {
        self.matches(relative_path, true)
    }

    /// Remove ignored entries from a list of relative paths.
    pub fn filter<I, S>(&self, paths: I) -> Vec<S>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths
            .into_iter()
            .filter(|p| !self.is_ignored(p.as_ref()))
            .collect()
    }

    /// Get the merged pattern list.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn matches(&self, relative_path: &str, is_dir: bool) -> bool {
        let normalized = normalize(relative_path);
        if normalized.is_empty() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(Path::new(&normalized), is_dir)
            .is_ignore()
    }
}

/// Forward slashes only, no leading `./` or `/`.
fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut trimmed = path.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.trim_end_matches('/').to_string()
}

fn build_matcher(root: &Path, patterns: &[String]) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .map_err(|source| SyncError::IgnorePattern {
                pattern: pattern.clone(),
                source,
            })?;
    }
    builder.build().map_err(|source| SyncError::IgnorePattern {
        pattern: patterns.join(", "),
        source,
    })
}
