pub mod backend;
pub mod memory;
pub mod s3;

pub use backend::{normalize_etag, ObjectStore, RemoteObject, MAX_DELETE_BATCH, TRANSFER_CHUNK_SIZE};
pub use memory::MemoryStore;
pub use s3::{OpendalStore, S3Provider};
