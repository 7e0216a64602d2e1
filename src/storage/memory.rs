use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;

use crate::storage::backend::{ObjectStore, RemoteObject};
use crate::sync::hash::hash_bytes;

/// Stored object with the metadata a real bucket would report
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub last_modified_ms: i64,
    pub etag: String,
}

/// In-process object store.
///
/// Behaves like a single-part-upload S3 bucket: the ETag is the MD5 of the
/// body and last-modified is set on every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole object body.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| anyhow!("NoSuchKey: {}", key))
    }

    /// Store `data` the way an S3 single-part upload would.
    pub async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) {
        let object = StoredObject {
            etag: hash_bytes(&data),
            data,
            content_type: content_type.to_string(),
            last_modified_ms: chrono::Utc::now().timestamp_millis(),
        };
        self.insert(key, object).await;
    }

    /// Insert an object with explicit metadata, bypassing `put`.
    pub async fn insert(&self, key: &str, object: StoredObject) {
        self.objects.write().await.insert(key.to_string(), object);
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let prefix = prefix.trim_matches('/');
        let scope = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        };

        let objects = self.objects.read().await;
        Ok(objects
            .range(scope.clone()..)
            .take_while(|(key, _)| key.starts_with(&scope))
            .map(|(key, obj)| RemoteObject {
                key: key.clone(),
                size: obj.data.len() as u64,
                last_modified_ms: Some(obj.last_modified_ms),
                etag: Some(obj.etag.clone()),
            })
            .collect())
    }

    async fn read_to(&self, key: &str, dest: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let data = self.get(key).await?;
        dest.write_all(&data).await?;
        Ok(data.len() as u64)
    }

    async fn write_from(
        &self,
        key: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
        content_type: &str,
    ) -> Result<u64> {
        let mut data = Vec::new();
        source.read_to_end(&mut data).await?;
        let size = data.len() as u64;
        self.put(key, data, content_type).await;
        Ok(size)
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<()> {
        let mut objects = self.objects.write().await;
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
