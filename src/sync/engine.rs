//! Sync engine for workspace <-> bucket prefix synchronization.
//!
//! Each operation lists both sides, diffs the manifests and fans the
//! resulting transfers out through a bounded limiter. Per-file failures are
//! collected into the [`SyncResult`]; only pre-flight problems (bad prefix,
//! unusable workspace) and local disk exhaustion abort an operation.

use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::SyncOptions;
use crate::error::{Result, SyncError};
use crate::logging::SyncLogger;
use crate::storage::{ObjectStore, OpendalStore, S3Provider};
use crate::sync::content_type::ContentTypeResolver;
use crate::sync::exclude::IgnoreFilter;
use crate::sync::limiter::ConcurrencyLimiter;
use crate::sync::manifest::{diff, object_key, FileInfo, Manifest, SyncPlan};
use crate::sync::path::validate;
use crate::sync::result::{SyncPhase, SyncProgress, SyncResult};
use crate::sync::scan::{error_chain, scan_workspace, LocalScan};
use crate::sync::throttle::BandwidthLimiter;

/// Suffix for in-progress downloads; matched by the default `*.tmp` ignore.
const PARTIAL_SUFFIX: &str = ".wsync.tmp";

/// Sync engine bound to one workspace and bucket prefix.
///
/// Holds no file state between calls: every operation recomputes both
/// manifests, so external changes between syncs are picked up.
pub struct SyncEngine {
    storage: Arc<dyn ObjectStore>,
    prefix: String,
    workspace: PathBuf,
    filter: Arc<IgnoreFilter>,
    download_limiter: ConcurrencyLimiter,
    upload_limiter: ConcurrencyLimiter,
    bandwidth: BandwidthLimiter,
    content_types: Arc<dyn ContentTypeResolver>,
    logger: Arc<dyn SyncLogger>,
    delete_local_extras: bool,
    prune_remote: bool,
    progress_tx: Option<UnboundedSender<SyncProgress>>,
}

impl SyncEngine {
    /// Create a sync engine.
    ///
    /// Fails on a zero concurrency limit, an invalid ignore pattern or when
    /// no storage client can be configured.
    pub fn new(options: SyncOptions) -> Result<Self> {
        let download_limiter = ConcurrencyLimiter::new(options.download_concurrency)?;
        let upload_limiter = ConcurrencyLimiter::new(options.upload_concurrency)?;
        let logger = options.logger.clone();

        let mut filter = IgnoreFilter::with_defaults();
        filter.add_patterns(&options.ignore_patterns)?;
        match filter.load_from_workspace(&options.workspace) {
            Ok(0) => logger.debug("using default ignore patterns", &[("workspace", &options.workspace.display())]),
            Ok(added) => logger.debug("loaded .syncignore", &[("patterns", &added)]),
            Err(e) => logger.warn(
                "could not read .syncignore, using default ignore patterns",
                &[("error", &error_chain(&e))],
            ),
        }

        let storage = match options.storage {
            Some(storage) => storage,
            None => {
                let provider = match &options.endpoint {
                    Some(endpoint) => S3Provider::Custom {
                        name: "custom".to_string(),
                        endpoint: endpoint.clone(),
                    },
                    None => S3Provider::Aws,
                };
                let store = OpendalStore::s3(&options.bucket, options.region.as_deref(), provider)
                    .map_err(|e| SyncError::storage("connect", &options.bucket, e))?;
                Arc::new(store)
            }
        };

        let bandwidth = BandwidthLimiter::new(options.bandwidth_limit);
        logger.debug(
            "sync engine configured",
            &[
                ("store", &storage.describe()),
                ("download_concurrency", &download_limiter.concurrency()),
                ("upload_concurrency", &upload_limiter.concurrency()),
                ("bandwidth", &bandwidth.limit().display()),
            ],
        );

        Ok(Self {
            storage,
            prefix: options.prefix.trim_matches('/').to_string(),
            workspace: options.workspace,
            filter: Arc::new(filter),
            download_limiter,
            upload_limiter,
            bandwidth,
            content_types: options.content_types,
            logger,
            delete_local_extras: options.delete_local_extras,
            prune_remote: options.prune_remote,
            progress_tx: None,
        })
    }

    /// Create a sync engine with progress reporting.
    pub fn with_progress(options: SyncOptions, progress_tx: UnboundedSender<SyncProgress>) -> Result<Self> {
        let mut engine = Self::new(options)?;
        engine.progress_tx = Some(progress_tx);
        Ok(engine)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn ignore_filter(&self) -> &IgnoreFilter {
        &self.filter
    }

    /// Stop admitting queued transfers. Running transfers finish and the
    /// in-progress operation returns a partial result. Terminal for this engine.
    pub fn cancel(&self) {
        self.logger.info("cancelling sync", &[("prefix", &self.prefix)]);
        self.download_limiter.close();
        self.upload_limiter.close();
    }

    /// Remote -> local.
    ///
    /// Downloads remote files that are missing or changed locally. Local-only
    /// files are kept unless `delete_local_extras` is set.
    pub async fn pull(&self) -> Result<SyncResult> {
        let started = Instant::now();
        validate(&self.prefix)?;
        self.logger.info("pull started", &[("prefix", &self.prefix), ("store", &self.storage.describe())]);

        let mut errors = Vec::new();

        let remote = match self.remote_manifest(&mut errors).await {
            Ok(remote) => remote,
            Err(e) => {
                errors.push(error_chain(&e));
                self.logger.error("pull aborted, remote listing failed", &[("error", &error_chain(&e))]);
                return Ok(SyncResult::pull(0, None, 0, errors, started.elapsed()));
            }
        };
        let local = self.local_manifest(&mut errors).await?;

        let plan = diff(&remote, &local.manifest, self.delete_local_extras, &local.unknown);
        self.log_plan("pull", &plan);

        let (downloaded, bytes) = self.download_all(&plan.transfers, &mut errors).await?;

        let deleted = if self.delete_local_extras {
            Some(self.delete_local(&plan.deletions, &mut errors).await)
        } else {
            None
        };

        let result = SyncResult::pull(downloaded, deleted, bytes, errors, started.elapsed());
        self.log_result("pull", &result);
        Ok(result)
    }

    /// Local -> remote.
    ///
    /// Uploads new and changed local files, then deletes remote objects that
    /// have no local counterpart unless `prune_remote` is off.
    pub async fn push(&self) -> Result<SyncResult> {
        let started = Instant::now();
        validate(&self.prefix)?;
        self.logger.info("push started", &[("prefix", &self.prefix), ("store", &self.storage.describe())]);

        let mut errors = Vec::new();

        let local = self.local_manifest(&mut errors).await?;
        let remote = match self.remote_manifest(&mut errors).await {
            Ok(remote) => remote,
            Err(e) => {
                errors.push(error_chain(&e));
                self.logger.error("push aborted, remote listing failed", &[("error", &error_chain(&e))]);
                return Ok(SyncResult::push(0, 0, 0, errors, started.elapsed()));
            }
        };

        let plan = diff(&local.manifest, &remote, self.prune_remote, &local.unknown);
        self.log_plan("push", &plan);

        let (uploaded, bytes) = self.upload_all(&plan.transfers, &mut errors).await;
        let deleted = self.delete_remote(&plan.deletions, &mut errors).await;

        let result = SyncResult::push(uploaded, deleted, bytes, errors, started.elapsed());
        self.log_result("push", &result);
        Ok(result)
    }

    /// Compute what [`pull`](Self::pull) would do without transferring anything.
    pub async fn plan_pull(&self) -> Result<SyncPlan> {
        validate(&self.prefix)?;
        let mut errors = Vec::new();
        let remote = self.remote_manifest(&mut errors).await?;
        let local = self.local_manifest(&mut errors).await?;
        self.log_skipped(&errors);
        Ok(diff(&remote, &local.manifest, self.delete_local_extras, &local.unknown))
    }

    /// Compute what [`push`](Self::push) would do without transferring anything.
    pub async fn plan_push(&self) -> Result<SyncPlan> {
        validate(&self.prefix)?;
        let mut errors = Vec::new();
        let local = self.local_manifest(&mut errors).await?;
        let remote = self.remote_manifest(&mut errors).await?;
        self.log_skipped(&errors);
        Ok(diff(&local.manifest, &remote, self.prune_remote, &local.unknown))
    }

    async fn remote_manifest(&self, errors: &mut Vec<String>) -> Result<Manifest> {
        let objects = self
            .storage
            .list(&self.prefix)
            .await
            .map_err(|e| SyncError::storage("list", self.prefix.clone(), e))?;

        let listed = objects.len();
        let (manifest, skipped) = Manifest::from_remote(objects, &self.prefix, &self.filter);
        self.logger.debug("listed remote", &[("objects", &listed), ("tracked", &manifest.len())]);
        errors.extend(skipped);
        Ok(manifest)
    }

    async fn local_manifest(&self, errors: &mut Vec<String>) -> Result<LocalScan> {
        let root = self.workspace.clone();
        let filter = self.filter.clone();

        let scan = tokio::task::spawn_blocking(move || scan_workspace(&root, &filter))
            .await
            .map_err(|e| SyncError::Workspace {
                path: self.workspace.clone(),
                source: std::io::Error::other(e),
            })??;

        self.logger.debug("scanned workspace", &[("files", &scan.manifest.len()), ("failed", &scan.errors.len())]);
        errors.extend(scan.errors.iter().cloned());
        Ok(scan)
    }

    async fn download_all(&self, files: &[FileInfo], errors: &mut Vec<String>) -> Result<(usize, u64)> {
        let total = files.len();
        let done = AtomicUsize::new(0);
        let exhausted = AtomicBool::new(false);

        let units = files.iter().map(|file| {
            let done = &done;
            let exhausted = &exhausted;
            async move {
                let outcome = self
                    .download_limiter
                    .run(|| async {
                        if exhausted.load(Ordering::SeqCst) {
                            return Err(SyncError::Cancelled);
                        }
                        let result = self.download_one(file).await;
                        if result.as_ref().is_err_and(SyncError::is_fatal) {
                            exhausted.store(true, Ordering::SeqCst);
                        }
                        result
                    })
                    .await
                    .and_then(|r| r);

                let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                self.emit(SyncProgress::new(SyncPhase::Download, current, total, Some(file.path.clone())));
                (file, outcome)
            }
        });

        let mut downloaded = 0;
        let mut bytes = 0;
        let mut fatal = None;

        for (file, outcome) in join_all(units).await {
            match outcome {
                Ok(size) => {
                    downloaded += 1;
                    bytes += size;
                }
                Err(e) if e.is_fatal() => {
                    self.logger.error("local storage exhausted", &[("file", &file.path)]);
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => self.record_failure("download", &file.path, &e, errors),
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok((downloaded, bytes)),
        }
    }

    async fn download_one(&self, file: &FileInfo) -> Result<u64> {
        let key = object_key(&self.prefix, &file.path);
        self.bandwidth.acquire(file.size).await;

        let target = self.local_path(&file.path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::local_write(parent, e))?;
        }

        // Write beside the target and rename so readers never see a torn file.
        let partial = partial_path(&target);
        let written = match self.stream_to_file(&key, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SyncError::local_write(target, e));
        }

        self.logger.debug("downloaded", &[("file", &file.path), ("bytes", &written)]);
        Ok(written)
    }

    async fn stream_to_file(&self, key: &str, path: &Path) -> Result<u64> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| SyncError::local_write(path, e))?;

        let written = self
            .storage
            .read_to(key, &mut file)
            .await
            .map_err(|e| SyncError::download(key, path, e))?;

        file.flush().await.map_err(|e| SyncError::local_write(path, e))?;
        Ok(written)
    }

    async fn upload_all(&self, files: &[FileInfo], errors: &mut Vec<String>) -> (usize, u64) {
        let total = files.len();
        let done = AtomicUsize::new(0);

        let units = files.iter().map(|file| {
            let done = &done;
            async move {
                let outcome = self
                    .upload_limiter
                    .run(|| self.upload_one(file))
                    .await
                    .and_then(|r| r);

                let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                self.emit(SyncProgress::new(SyncPhase::Upload, current, total, Some(file.path.clone())));
                (file, outcome)
            }
        });

        let mut uploaded = 0;
        let mut bytes = 0;

        for (file, outcome) in join_all(units).await {
            match outcome {
                Ok(size) => {
                    uploaded += 1;
                    bytes += size;
                }
                Err(e) => self.record_failure("upload", &file.path, &e, errors),
            }
        }

        (uploaded, bytes)
    }

    async fn upload_one(&self, file: &FileInfo) -> Result<u64> {
        let source = self.local_path(&file.path);
        let mut reader = tokio::fs::File::open(&source).await.map_err(|e| SyncError::Io {
            path: source.clone(),
            source: e,
        })?;
        self.bandwidth.acquire(file.size).await;

        let key = object_key(&self.prefix, &file.path);
        let content_type = self.content_types.resolve(&file.path);

        let size = self
            .storage
            .write_from(&key, &mut reader, &content_type)
            .await
            .map_err(|e| SyncError::storage("put", key.clone(), e))?;

        self.logger.debug("uploaded", &[("file", &file.path), ("bytes", &size), ("content_type", &content_type)]);
        Ok(size)
    }

    /// Delete orphaned remote objects in batches sized for the storage API.
    async fn delete_remote(&self, paths: &[String], errors: &mut Vec<String>) -> usize {
        let total = paths.len();
        let batch_size = self.storage.max_delete_batch().max(1);
        let mut deleted = 0;

        for (index, batch) in paths.chunks(batch_size).enumerate() {
            if self.is_cancelled() {
                self.skip_cancelled(&paths[index * batch_size..], errors);
                break;
            }

            let keys: Vec<String> = batch.iter().map(|p| object_key(&self.prefix, p)).collect();

            match self.storage.delete_batch(&keys).await {
                Ok(()) => {
                    deleted += batch.len();
                    self.logger.debug("deleted remote batch", &[("objects", &batch.len())]);
                }
                Err(e) => {
                    let e = SyncError::storage("delete", format!("{} objects", keys.len()), e);
                    self.logger.warn("remote delete failed", &[("objects", &keys.len()), ("error", &error_chain(&e))]);
                    for path in batch {
                        errors.push(format!("{}: {}", path, error_chain(&e)));
                    }
                }
            }

            self.emit(SyncProgress::new(SyncPhase::Cleanup, deleted, total, None));
        }

        deleted
    }

    /// Remove local files absent remotely (remote-authoritative pull).
    async fn delete_local(&self, paths: &[String], errors: &mut Vec<String>) -> usize {
        let total = paths.len();
        let mut deleted = 0;

        for (index, path) in paths.iter().enumerate() {
            if self.is_cancelled() {
                self.skip_cancelled(&paths[index..], errors);
                break;
            }

            let target = self.local_path(path);
            match tokio::fs::remove_file(&target).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => deleted += 1,
                Err(e) => {
                    let e = SyncError::Io { path: target, source: e };
                    self.record_failure("delete", path, &e, errors);
                }
            }
            self.emit(SyncProgress::new(SyncPhase::Cleanup, index + 1, total, Some(path.clone())));
        }

        deleted
    }

    fn is_cancelled(&self) -> bool {
        self.download_limiter.is_closed() || self.upload_limiter.is_closed()
    }

    /// Record deletions that were not attempted because the engine was cancelled.
    fn skip_cancelled(&self, paths: &[String], errors: &mut Vec<String>) {
        self.logger.info("cleanup skipped after cancel", &[("deletions", &paths.len())]);
        for path in paths {
            errors.push(format!("{}: {}", path, SyncError::Cancelled));
        }
    }

    fn local_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.workspace.clone(), |path, segment| path.join(segment))
    }

    fn emit(&self, progress: SyncProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress);
        }
    }

    fn record_failure(&self, operation: &str, path: &str, err: &SyncError, errors: &mut Vec<String>) {
        let message = format!("{}: {}", path, error_chain(err));
        self.logger.warn("transfer failed", &[("operation", &operation), ("error", &message)]);
        errors.push(message);
    }

    fn log_plan(&self, operation: &str, plan: &SyncPlan) {
        self.logger.info(
            "sync plan computed",
            &[
                ("operation", &operation),
                ("transfers", &plan.transfers.len()),
                ("deletions", &plan.deletions.len()),
                ("unchanged", &plan.unchanged),
            ],
        );
    }

    fn log_result(&self, operation: &str, result: &SyncResult) {
        let context: &[(&str, &dyn std::fmt::Display)] = &[
            ("operation", &operation),
            ("transferred", &result.transferred_files()),
            ("deleted", &result.deleted_files.unwrap_or(0)),
            ("errors", &result.errors.len()),
            ("duration_ms", &result.duration.as_millis()),
        ];
        if result.success {
            self.logger.info("sync complete", context);
        } else {
            self.logger.warn("sync finished with errors", context);
        }
    }

    fn log_skipped(&self, errors: &[String]) {
        for error in errors {
            self.logger.warn("skipped during planning", &[("error", error)]);
        }
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}
