//! Bounded parallelism for transfer work.
//!
//! A fair (FIFO) semaphore admits at most `concurrency` units at a time.
//! Units waiting for a permit are admitted in request order regardless of
//! whether earlier units succeeded or failed.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{Result, SyncError};

/// Default number of simultaneous downloads.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 50;

/// Default number of simultaneous uploads.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 10;

/// Throttle for asynchronous units of work.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting at most `concurrency` units at once.
    pub fn new(concurrency: usize) -> Result<Self> {
        if concurrency == 0 || concurrency > Semaphore::MAX_PERMITS {
            return Err(SyncError::InvalidConcurrency(concurrency));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        })
    }

    /// Run a deferred unit of work once capacity is available.
    ///
    /// `work` is not called until a slot is free. The slot is released when
    /// the returned future completes or is dropped. Fails with
    /// [`SyncError::Cancelled`] if the limiter was closed before admission.
    pub async fn run<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SyncError::Cancelled)?;

        Ok(work().await)
    }

    /// Stop admitting queued and future units. In-flight units keep running.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Configured maximum.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Units currently running.
    pub fn active(&self) -> usize {
        self.concurrency - self.semaphore.available_permits()
    }
}
