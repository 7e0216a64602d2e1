//! Values returned to sync callers.

use serde::Serialize;
use std::time::Duration;

/// Stage of a running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Download,
    Upload,
    Cleanup,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Download => "download",
            SyncPhase::Upload => "upload",
            SyncPhase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Progress event emitted as units complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// Units finished so far in this phase
    pub current: usize,
    /// Units scheduled in this phase
    pub total: usize,
    /// 0-100
    pub percentage: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
}

impl SyncProgress {
    pub fn new(phase: SyncPhase, current: usize, total: usize, current_file: Option<String>) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            (current as f32 / total as f32 * 100.0).min(100.0)
        };

        Self {
            phase,
            current,
            total,
            percentage,
            current_file,
        }
    }
}

/// Outcome of one `pull()` or `push()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// True when no error was recorded
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_files: Option<usize>,
    pub bytes_transferred: u64,
    pub errors: Vec<String>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl SyncResult {
    pub(crate) fn pull(downloaded: usize, deleted: Option<usize>, bytes: u64, errors: Vec<String>, duration: Duration) -> Self {
        Self {
            success: errors.is_empty(),
            downloaded_files: Some(downloaded),
            uploaded_files: None,
            deleted_files: deleted,
            bytes_transferred: bytes,
            errors,
            duration,
        }
    }

    pub(crate) fn push(uploaded: usize, deleted: usize, bytes: u64, errors: Vec<String>, duration: Duration) -> Self {
        Self {
            success: errors.is_empty(),
            downloaded_files: None,
            uploaded_files: Some(uploaded),
            deleted_files: Some(deleted),
            bytes_transferred: bytes,
            errors,
            duration,
        }
    }

    /// Files moved in either direction.
    pub fn transferred_files(&self) -> usize {
        self.downloaded_files.unwrap_or(0) + self.uploaded_files.unwrap_or(0)
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
