//! Storage path validation.
//!
//! Prefixes are partly derived from user-selected storage locations, so they
//! are checked before any listing or transfer touches the bucket.

use crate::error::PathValidationError;

/// Maximum number of non-empty segments allowed in a storage path.
pub const MAX_PATH_DEPTH: usize = 50;

/// Validate a storage path or prefix.
///
/// Rejects traversal (`..`), null bytes, characters outside
/// `[A-Za-z0-9-_/.]`, protocol-relative paths (`//host/...`) and paths with
/// more than [`MAX_PATH_DEPTH`] non-empty segments.
pub fn validate(path: &str) -> Result<(), PathValidationError> {
    if path.contains("..") {
        return Err(PathValidationError::Traversal(path.to_string()));
    }

    if path.contains('\0') {
        return Err(PathValidationError::NullByte(path.to_string()));
    }

    if let Some(ch) = path.chars().find(|c| !is_allowed_char(*c)) {
        return Err(PathValidationError::InvalidCharacter {
            path: path.to_string(),
            ch,
        });
    }

    if path.starts_with("//") {
        return Err(PathValidationError::ProtocolRelative(path.to_string()));
    }

    let depth = path.split('/').filter(|s| !s.is_empty()).count();
    if depth > MAX_PATH_DEPTH {
        return Err(PathValidationError::TooDeep {
            path: path.to_string(),
            depth,
            max: MAX_PATH_DEPTH,
        });
    }

    Ok(())
}

/// Check that a relative key taken from a remote listing stays inside the
/// workspace when joined onto it.
///
/// This is looser than [`validate`]: object keys may contain spaces and
/// unicode, but never `..` segments, null bytes or a leading root.
pub fn validate_relative_key(key: &str) -> Result<(), PathValidationError> {
    if key.contains('\0') {
        return Err(PathValidationError::NullByte(key.to_string()));
    }

    if key.starts_with('/') || key.starts_with('\\') || has_drive_prefix(key) {
        return Err(PathValidationError::Absolute(key.to_string()));
    }

    if key.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PathValidationError::Traversal(key.to_string()));
    }

    Ok(())
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.')
}

fn has_drive_prefix(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
