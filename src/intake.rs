// src/intake.rs

use crate::error::UploadError;

/// Upload size ceiling: 15 MB.
pub const MAX_UPLOAD_BYTES: u64 = 15 * 1024 * 1024;

/// File extensions the upstream text-acquisition step knows how to read.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".bmp", ".tiff", ".gif", ".txt", ".text", ".csv",
];

/// Check an uploaded file's name and size before it reaches extraction.
/// Violations are surfaced to the caller as a rejected upload, never
/// silently degraded.
pub fn validate_upload(filename: &str, size: u64) -> Result<(), UploadError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge {
            size,
            max: MAX_UPLOAD_BYTES,
        });
    }
    let lower = filename.to_lowercase();
    if !ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Err(UploadError::DisallowedType(filename.to_string()));
    }
    Ok(())
}
