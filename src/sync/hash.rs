//! Content fingerprints for change detection.
//!
//! MD5 is used because a single-part S3 upload reports the MD5 of the body as
//! its ETag, which lets the remote listing be compared without downloads.
//! The digest is not a security primitive.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::{Result, SyncError};

/// Read buffer size for streamed hashing.
const CHUNK_SIZE: usize = 64 * 1024;

/// Hash bytes, returning a lowercase hex digest.
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// Hash everything readable from `reader` in fixed-size chunks.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash a file. Memory use is bounded by the chunk size, not the file size.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    hash_reader(file).map_err(|source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Whether an ETag is a plain content MD5 rather than a composite
/// multipart tag (`<hex>-<parts>`) or an opaque provider value.
pub fn is_content_etag(etag: &str) -> bool {
    etag.len() == 32 && etag.bytes().all(|b| b.is_ascii_hexdigit())
}
