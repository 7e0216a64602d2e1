//! Engine configuration.
//!
//! [`SyncOptions`] is the immutable configuration handed to the engine.
//! [`ConfigFile`] is its TOML form, used by the `wsync` binary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, SyncError};
use crate::logging::{SyncLogger, TracingLogger};
use crate::storage::ObjectStore;
use crate::sync::content_type::{ContentTypeResolver, ExtensionResolver};
use crate::sync::limiter::{DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_UPLOAD_CONCURRENCY};
use crate::sync::throttle::BandwidthLimit;

/// Configuration for one workspace <-> bucket prefix pairing.
#[derive(Clone)]
pub struct SyncOptions {
    pub bucket: String,
    pub prefix: String,
    pub workspace: PathBuf,
    pub region: Option<String>,
    /// Custom S3-compatible endpoint
    pub endpoint: Option<String>,
    /// Storage client override; when unset an S3 client is built from
    /// `bucket`, `region` and `endpoint`
    pub storage: Option<Arc<dyn ObjectStore>>,
    pub download_concurrency: usize,
    pub upload_concurrency: usize,
    /// Extra ignore patterns merged after the built-in defaults
    pub ignore_patterns: Vec<String>,
    pub content_types: Arc<dyn ContentTypeResolver>,
    pub logger: Arc<dyn SyncLogger>,
    pub bandwidth_limit: BandwidthLimit,
    /// Pull removes local files that are absent remotely
    pub delete_local_extras: bool,
    /// Push removes remote objects that are absent locally
    pub prune_remote: bool,
}

impl SyncOptions {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            workspace: workspace.into(),
            region: None,
            endpoint: None,
            storage: None,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            ignore_patterns: Vec::new(),
            content_types: Arc::new(ExtensionResolver),
            logger: Arc::new(TracingLogger),
            bandwidth_limit: BandwidthLimit::unlimited(),
            delete_local_extras: false,
            prune_remote: true,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_download_concurrency(mut self, concurrency: usize) -> Self {
        self.download_concurrency = concurrency;
        self
    }

    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency;
        self
    }

    pub fn with_ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn with_content_types(mut self, resolver: Arc<dyn ContentTypeResolver>) -> Self {
        self.content_types = resolver;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn SyncLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_bandwidth_limit(mut self, limit: BandwidthLimit) -> Self {
        self.bandwidth_limit = limit;
        self
    }

    pub fn with_delete_local_extras(mut self, enabled: bool) -> Self {
        self.delete_local_extras = enabled;
        self
    }

    pub fn with_prune_remote(mut self, enabled: bool) -> Self {
        self.prune_remote = enabled;
        self
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("workspace", &self.workspace)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("storage", &self.storage.as_ref().map(|s| s.describe()))
            .field("download_concurrency", &self.download_concurrency)
            .field("upload_concurrency", &self.upload_concurrency)
            .field("ignore_patterns", &self.ignore_patterns)
            .field("bandwidth_limit", &self.bandwidth_limit.display())
            .field("delete_local_extras", &self.delete_local_extras)
            .field("prune_remote", &self.prune_remote)
            .finish_non_exhaustive()
    }
}

/// TOML configuration file.
///
/// ```toml
/// bucket = "agent-workspaces"
/// prefix = "users/alice/work"
/// workspace = "/srv/workspace"
/// region = "eu-west-1"
/// upload_concurrency = 8
/// ignore = ["*.csv", "scratch/"]
/// bandwidth_limit = 10485760
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub workspace: Option<PathBuf>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub download_concurrency: Option<usize>,
    pub upload_concurrency: Option<usize>,
    pub ignore: Vec<String>,
    pub bandwidth_limit: Option<BandwidthLimit>,
    pub delete_local_extras: Option<bool>,
    pub prune_remote: Option<bool>,
}

impl ConfigFile {
    /// `<config dir>/wsync/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wsync").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overlay `other` on top of `self`; set values in `other` win and
    /// ignore patterns are appended.
    pub fn merge(mut self, other: ConfigFile) -> Self {
        self.bucket = other.bucket.or(self.bucket);
        self.prefix = other.prefix.or(self.prefix);
        self.workspace = other.workspace.or(self.workspace);
        self.region = other.region.or(self.region);
        self.endpoint = other.endpoint.or(self.endpoint);
        self.download_concurrency = other.download_concurrency.or(self.download_concurrency);
        self.upload_concurrency = other.upload_concurrency.or(self.upload_concurrency);
        self.ignore.extend(other.ignore);
        self.bandwidth_limit = other.bandwidth_limit.or(self.bandwidth_limit);
        self.delete_local_extras = other.delete_local_extras.or(self.delete_local_extras);
        self.prune_remote = other.prune_remote.or(self.prune_remote);
        self
    }

    /// Resolve into engine options. `bucket` and `workspace` are required.
    pub fn into_options(self) -> Result<SyncOptions> {
        let bucket = self
            .bucket
            .ok_or_else(|| SyncError::Config("bucket is not set".to_string()))?;
        let workspace = self
            .workspace
            .ok_or_else(|| SyncError::Config("workspace is not set".to_string()))?;

        let mut options = SyncOptions::new(bucket, self.prefix.unwrap_or_default(), workspace)
            .with_ignore_patterns(self.ignore);

        options.region = self.region;
        options.endpoint = self.endpoint;
        if let Some(n) = self.download_concurrency {
            options.download_concurrency = n;
        }
        if let Some(n) = self.upload_concurrency {
            options.upload_concurrency = n;
        }
        if let Some(limit) = self.bandwidth_limit {
            options.bandwidth_limit = limit;
        }
        if let Some(enabled) = self.delete_local_extras {
            options.delete_local_extras = enabled;
        }
        if let Some(enabled) = self.prune_remote {
            options.prune_remote = enabled;
        }

        Ok(options)
    }
}
