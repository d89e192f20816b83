//! Image attachments: path normalization, MIME detection and `data:` URIs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Largest image accepted as an attachment (3.75MB before base64).
pub const MAX_IMAGE_BYTES: u64 = 3_932_160;

const SUPPORTED_IMAGE_MIMES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Normalizes user-provided file paths.
///
/// Handles common drag-and-drop shell escaping (`\ `, `\(`, `\)`) and
/// expands `~/` to the home directory when available.
#[must_use]
pub fn normalize_input_path(path: &str) -> PathBuf {
    let unescaped = path
        .replace("\\ ", " ")
        .replace("\\(", "(")
        .replace("\\)", ")");

    if let Some(rest) = unescaped.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }

    PathBuf::from(unescaped)
}

/// MIME type for supported image extensions.
#[must_use]
pub fn mime_type_for_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension().and_then(|e| e.to_str())?;

    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// MIME type sniffed from magic bytes, limited to supported formats.
fn mime_type_for_content(data: &[u8]) -> Option<&'static str> {
    let mime = infer::get(data)?.mime_type();
    SUPPORTED_IMAGE_MIMES.iter().copied().find(|m| *m == mime)
}

/// Reads an image and encodes it as `data:<mime>;base64,<payload>`.
///
/// The extension decides the MIME type; files without a known extension are
/// sniffed.
///
/// # Errors
/// Returns an error if the file cannot be read, exceeds `MAX_IMAGE_BYTES`,
/// or is not a supported image format.
pub fn load_image_data_uri(path: &Path) -> Result<String> {
    let size = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?
        .len();
    if size > MAX_IMAGE_BYTES {
        anyhow::bail!(
            "Image {} is too large ({size} bytes, maximum {MAX_IMAGE_BYTES})",
            path.display()
        );
    }

    let data =
        fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    let mime = mime_type_for_extension(path)
        .or_else(|| mime_type_for_content(&data))
        .with_context(|| format!("Unsupported image format: {}", path.display()))?;

    Ok(format!("data:{mime};base64,{}", BASE64.encode(&data)))
}
