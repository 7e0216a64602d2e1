//! Workspace <-> object storage synchronization.
//!
//! Leaf components (path validation, hashing, ignore rules, limiters) are
//! independent; [`engine::SyncEngine`] composes them into `pull` and `push`.

pub mod content_type;
pub mod engine;
pub mod exclude;
pub mod hash;
pub mod limiter;
pub mod manifest;
pub mod path;
pub mod result;
pub mod scan;
pub mod throttle;

pub use content_type::{content_type_from_extension, ContentTypeResolver, ExtensionResolver};
pub use engine::SyncEngine;
pub use exclude::{IgnoreFilter, DEFAULT_IGNORES, IGNORE_FILE_NAME};
pub use hash::{hash_bytes, hash_file};
pub use limiter::ConcurrencyLimiter;
pub use manifest::{diff, needs_transfer, FileInfo, Manifest, SyncPlan, UnknownPaths};
pub use path::{validate, MAX_PATH_DEPTH};
pub use result::{SyncPhase, SyncProgress, SyncResult};
pub use throttle::{BandwidthLimit, BandwidthLimiter};
