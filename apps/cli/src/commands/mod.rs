//! Command implementations for the gemlink CLI.

pub mod ask;
pub mod chat;
pub mod models;

use anyhow::{Context, Result};
use gemlink_abstraction::NormalizedResult;
use std::path::{Path, PathBuf};

/// File extension for an image MIME type.
pub fn image_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Default file name for a saved image.
pub fn default_image_path(stem: &str, mime_type: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", stem, image_extension(mime_type)))
}

/// Decodes an image result and writes the bytes to `path`.
pub fn write_image(result: &NormalizedResult, path: &Path) -> Result<usize> {
    let bytes = result
        .decode_image()
        .context("Result does not contain an image")?
        .context("Image payload is not valid base64")?;
    std::fs::write(path, &bytes).with_context(|| format!("Failed to write image to {}", path.display()))?;
    Ok(bytes.len())
}
