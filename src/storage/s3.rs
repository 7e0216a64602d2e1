use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use futures::TryStreamExt;
use opendal::{services::S3, Operator};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::storage::backend::{normalize_etag, ObjectStore, RemoteObject, TRANSFER_CHUNK_SIZE};

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible storage providers
#[derive(Debug, Clone, PartialEq, Default)]
pub enum S3Provider {
    #[default]
    Aws,
    Custom { name: String, endpoint: String },
}

impl S3Provider {
    /// Get the endpoint URL for this provider
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            S3Provider::Aws => None, // default AWS endpoint
            S3Provider::Custom { endpoint, .. } => Some(endpoint),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            S3Provider::Aws => "AWS S3",
            S3Provider::Custom { name, .. } => name,
        }
    }
}

/// Object store backed by an OpenDAL operator
pub struct OpendalStore {
    operator: Operator,
    description: String,
}

impl OpendalStore {
    /// Create an S3 store using the ambient credential chain:
    ///
    /// 1. Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY)
    /// 2. Shared credentials file (~/.aws/credentials)
    /// 3. EC2 Instance Profile / ECS Task Role / EKS Pod Identity
    pub fn s3(bucket: &str, region: Option<&str>, provider: S3Provider) -> Result<Self> {
        let region = region.unwrap_or(DEFAULT_REGION);
        let mut builder = S3::default().bucket(bucket).region(region);

        if let Some(endpoint) = provider.endpoint() {
            builder = builder.endpoint(endpoint);
        }

        let operator = Operator::new(builder)
            .with_context(|| format!("Failed to configure {} bucket {}", provider.display_name(), bucket))?
            .finish();

        Ok(Self {
            operator,
            description: format!("s3://{}", bucket),
        })
    }

    /// Wrap an already configured operator (any OpenDAL service).
    pub fn from_operator(operator: Operator, description: impl Into<String>) -> Self {
        Self {
            operator,
            description: description.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for OpendalStore {
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let prefix = prefix.trim_start_matches('/');
        let path = if !prefix.is_empty() && !prefix.ends_with('/') {
            format!("{}/", prefix)
        } else {
            prefix.to_string()
        };

        let entries = self
            .operator
            .list_with(&path)
            .recursive(true)
            .await
            .with_context(|| format!("Failed to list {}/{}", self.description, path))?;

        let mut result = Vec::with_capacity(entries.len());

        for entry in entries {
            let meta = entry.metadata();
            // Skip directory markers
            if meta.mode().is_dir() || entry.path().ends_with('/') {
                continue;
            }

            result.push(RemoteObject {
                key: entry.path().to_string(),
                size: meta.content_length(),
                last_modified_ms: meta
                    .last_modified()
                    .and_then(|t| parse_timestamp_ms(&t.to_string())),
                etag: meta.etag().map(normalize_etag),
            });
        }

        Ok(result)
    }

    async fn read_to(&self, key: &str, dest: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let reader = self
            .operator
            .reader_with(key)
            .chunk(TRANSFER_CHUNK_SIZE)
            .await
            .with_context(|| format!("Failed to open {}/{}", self.description, key))?;
        let mut chunks = reader
            .into_bytes_stream(..)
            .await
            .with_context(|| format!("Failed to read {}/{}", self.description, key))?;

        let mut written = 0u64;
        while let Some(chunk) = chunks
            .try_next()
            .await
            .with_context(|| format!("Failed to read {}/{}", self.description, key))?
        {
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    async fn write_from(
        &self,
        key: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
        content_type: &str,
    ) -> Result<u64> {
        let mut writer = self
            .operator
            .writer_with(key)
            .content_type(content_type)
            .chunk(TRANSFER_CHUNK_SIZE)
            .await
            .with_context(|| format!("Failed to open {}/{} for writing", self.description, key))?;

        let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE.min(64 * 1024)];
        let mut read = 0u64;
        loop {
            let n = match source.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e.into());
                }
            };
            if let Err(e) = writer.write(buf[..n].to_vec()).await {
                let _ = writer.abort().await;
                return Err(e).with_context(|| format!("Failed to write {}/{}", self.description, key));
            }
            read += n as u64;
        }

        writer
            .close()
            .await
            .with_context(|| format!("Failed to write {}/{}", self.description, key))?;
        Ok(read)
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<()> {
        self.operator
            .delete_iter(keys.iter().cloned())
            .await
            .with_context(|| format!("Failed to delete {} objects from {}", keys.len(), self.description))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Parse a provider timestamp (RFC 3339 or `YYYY-MM-DD HH:MM:SS[.f] UTC`)
/// into epoch milliseconds.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }

    let naive = raw.trim().trim_end_matches("UTC").trim_end();
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}
