// Library module for workspace-sync
// Re-exports modules for use in integration tests and the wsync binary

pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod sync;

pub use config::{ConfigFile, SyncOptions};
pub use error::{PathValidationError, Result, SyncError};
pub use logging::{SyncLogger, TracingLogger};
pub use storage::{MemoryStore, ObjectStore, OpendalStore, RemoteObject};
pub use sync::{SyncEngine, SyncPhase, SyncPlan, SyncProgress, SyncResult};
