//! Error types for workspace sync.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Boxed cause carried by storage errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Rejection reasons for a storage path or prefix
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathValidationError {
    #[error("path traversal detected in `{0}`")]
    Traversal(String),

    #[error("null byte in `{0}`")]
    NullByte(String),

    #[error("invalid character {ch:?} in `{path}`")]
    InvalidCharacter { path: String, ch: char },

    #[error("protocol-relative path `{0}`")]
    ProtocolRelative(String),

    #[error("path `{path}` is {depth} segments deep (max {max})")]
    TooDeep { path: String, depth: usize, max: usize },

    #[error("absolute path `{0}` where a relative key was expected")]
    Absolute(String),
}

/// Main error type for sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("invalid storage path: {0}")]
    PathValidation(#[from] PathValidationError),

    #[error("invalid concurrency {0}: must be at least 1")]
    InvalidConcurrency(usize),

    #[error("workspace directory {} is not usable", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("storage {operation} failed for `{key}`")]
    Storage {
        operation: &'static str,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("local storage exhausted while writing {}", path.display())]
    ResourceExhausted {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid ignore pattern `{pattern}`")]
    IgnorePattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Wrap a storage client failure, keeping its cause chain.
    pub fn storage(operation: &'static str, key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Storage {
            operation,
            key: key.into(),
            source: source.into(),
        }
    }

    /// Classify a local write failure; a full disk is reported as exhaustion.
    pub fn local_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if is_storage_full(&source) {
            Self::ResourceExhausted { path, source }
        } else {
            Self::Io { path, source }
        }
    }

    /// Classify a failed streamed download into `path`. A full local disk
    /// anywhere in the cause chain is exhaustion, anything else a storage error.
    pub fn download(key: impl Into<String>, path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        let exhausted = source
            .chain()
            .filter_map(|cause| cause.downcast_ref::<io::Error>())
            .find(|cause| is_storage_full(cause))
            .map(|cause| match cause.raw_os_error() {
                Some(code) => io::Error::from_raw_os_error(code),
                None => io::Error::from(cause.kind()),
            });

        match exhausted {
            Some(source) => Self::ResourceExhausted {
                path: path.into(),
                source,
            },
            None => Self::storage("get", key, source),
        }
    }

    /// Whether this error must abort the whole operation rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PathValidation(_)
                | Self::InvalidConcurrency(_)
                | Self::Workspace { .. }
                | Self::ResourceExhausted { .. }
                | Self::Config(_)
        )
    }
}

fn is_storage_full(err: &io::Error) -> bool {
    // ENOSPC on unix, ERROR_DISK_FULL on windows
    err.kind() == io::ErrorKind::StorageFull
        || matches!(err.raw_os_error(), Some(28) if cfg!(unix))
        || matches!(err.raw_os_error(), Some(112) if cfg!(windows))
}
