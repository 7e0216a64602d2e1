//! MIME type lookup for uploads.

use std::path::Path;

/// Fallback for unknown extensions.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Maps a file name to the `Content-Type` sent with its upload.
pub trait ContentTypeResolver: Send + Sync {
    fn resolve(&self, filename: &str) -> String;
}

impl<F> ContentTypeResolver for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn resolve(&self, filename: &str) -> String {
        self(filename)
    }
}

/// Extension-based resolver used unless the caller supplies one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionResolver;

impl ContentTypeResolver for ExtensionResolver {
    fn resolve(&self, filename: &str) -> String {
        content_type_from_extension(filename).to_string()
    }
}

/// Detect content type from the file extension.
pub fn content_type_from_extension(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let Some(ext) = ext else {
        return DEFAULT_CONTENT_TYPE;
    };

    match ext.as_str() {
        // text
        "txt" | "text" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "json" => "application/json",
        "js" | "mjs" => "text/javascript",
        "ts" => "text/typescript",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "sh" => "application/x-sh",
        // images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        // documents and archives
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "wasm" => "application/wasm",
        // media
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
