// Shared fixtures: workspace helpers and a failure-injecting store

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite};

use workspace_sync::storage::{MemoryStore, ObjectStore, RemoteObject};
use workspace_sync::SyncOptions;

pub const BUCKET: &str = "agent-workspaces";
pub const PREFIX: &str = "users/alice/work";

pub fn key(relative: &str) -> String {
    format!("{}/{}", PREFIX, relative)
}

pub fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn read(root: &Path, relative: &str) -> Vec<u8> {
    fs::read(root.join(relative)).unwrap()
}

pub fn options(dir: &TempDir, store: Arc<dyn ObjectStore>) -> SyncOptions {
    SyncOptions::new(BUCKET, PREFIX, dir.path()).with_storage(store)
}

pub async fn seed(store: &MemoryStore, files: &[(&str, &[u8])]) {
    for (relative, content) in files {
        store.put(&key(relative), content.to_vec(), "application/octet-stream").await;
    }
}

/// Wraps a [`MemoryStore`], failing chosen keys and recording call shapes.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    fail_keys: HashSet<String>,
    fail_list: AtomicBool,
    delay: Duration,
    batch_limit: usize,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub delete_batches: Mutex<Vec<usize>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_keys: HashSet::new(),
            fail_list: AtomicBool::new(false),
            delay: Duration::ZERO,
            batch_limit: 1000,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delete_batches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, relative: &str) -> Self {
        self.fail_keys.insert(key(relative));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Transfers currently inside the store.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn fail_listing(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    async fn transfer<T>(&self, key: &str, work: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = if self.fail_keys.contains(key) {
            Err(anyhow!("injected failure: {}", key))
        } else {
            work.await
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("AccessDenied: list {}", prefix));
        }
        self.inner.list(prefix).await
    }

    async fn read_to(&self, key: &str, dest: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        self.transfer(key, self.inner.read_to(key, dest)).await
    }

    async fn write_from(
        &self,
        key: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
        content_type: &str,
    ) -> Result<u64> {
        self.transfer(key, self.inner.write_from(key, source, content_type)).await
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<()> {
        self.delete_batches.lock().unwrap().push(keys.len());
        if keys.iter().any(|k| self.fail_keys.contains(k)) {
            return Err(anyhow!("injected batch failure"));
        }
        self.inner.delete_batch(keys).await
    }

    fn max_delete_batch(&self) -> usize {
        self.batch_limit
    }

    fn describe(&self) -> String {
        format!("flaky+{}", self.inner.describe())
    }
}
