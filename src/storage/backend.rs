use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Buffer size for streamed transfers.
pub const TRANSFER_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// S3 DeleteObjects accepts at most this many keys per request.
pub const MAX_DELETE_BATCH: usize = 1000;

/// One object returned by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Full object key including the prefix
    pub key: String,
    pub size: u64,
    /// Last-modified time in epoch milliseconds, if the provider reports it
    pub last_modified_ms: Option<i64>,
    /// ETag with surrounding quotes removed
    pub etag: Option<String>,
}

/// Object storage operations used by the sync engine.
///
/// Implementations must tolerate concurrent calls; every method is
/// independent and keys are always `/`-separated.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object under `prefix`, recursively.
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// Stream an object into `dest`, returning the bytes written. `dest` is
    /// not flushed.
    async fn read_to(&self, key: &str, dest: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64>;

    /// Create or replace an object from `source`, returning the bytes read.
    async fn write_from(
        &self,
        key: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
        content_type: &str,
    ) -> Result<u64>;

    /// Delete up to [`max_delete_batch`](Self::max_delete_batch) objects.
    /// Missing keys are not an error.
    async fn delete_batch(&self, keys: &[String]) -> Result<()>;

    fn max_delete_batch(&self) -> usize {
        MAX_DELETE_BATCH
    }

    /// Human-readable location, e.g. `s3://bucket`
    fn describe(&self) -> String;
}

/// Strip the quotes S3 puts around ETags.
pub fn normalize_etag(etag: &str) -> String {
    etag.trim_start_matches("W/").trim_matches('"').to_string()
}
