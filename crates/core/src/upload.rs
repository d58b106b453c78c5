//! Receipt image constraints.
//!
//! Receipts are photos or screenshots of a bank transfer. Only a few image
//! formats are accepted, and the declared content type must agree with the
//! file's leading magic bytes.

use serde::{Deserialize, Serialize};

/// Default maximum receipt size: 5 MiB.
pub const MAX_RECEIPT_BYTES: usize = 5 * 1024 * 1024;

/// Why an uploaded file was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// Not an accepted image type, empty, or content does not match the declared type.
    #[error("receipt must be a JPEG, PNG, or WebP image")]
    InvalidFileType,
    /// Larger than the configured limit.
    #[error("receipt must be at most {max_bytes} bytes")]
    FileTooLarge {
        /// Configured limit.
        max_bytes: usize,
    },
}

impl UploadError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidFileType => "invalid_file_type",
            Self::FileTooLarge { .. } => "file_too_large",
        }
    }
}

/// Accepted receipt image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Jpeg,
    Png,
    Webp,
}

impl ImageType {
    /// Look up an accepted type by MIME type. Parameters such as `; charset=` are ignored.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Detect the format from leading magic bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP".as_slice()) {
            Some(Self::Webp)
        } else {
            None
        }
    }

    /// Canonical MIME type.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    /// File extension used when storing the blob.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

impl std::fmt::Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.content_type())
    }
}

/// Validate an uploaded receipt and return its detected type.
///
/// When `declared` is `None` the magic bytes alone decide.
///
/// # Errors
///
/// - [`UploadError::FileTooLarge`] if `bytes` exceeds `max_bytes`
/// - [`UploadError::InvalidFileType`] if empty, unrecognised, or mismatched
pub fn validate_receipt_image(
    declared: Option<&str>,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<ImageType, UploadError> {
    if bytes.len() > max_bytes {
        return Err(UploadError::FileTooLarge { max_bytes });
    }
    if bytes.is_empty() {
        return Err(UploadError::InvalidFileType);
    }

    let detected = ImageType::sniff(bytes).ok_or(UploadError::InvalidFileType)?;

    if let Some(declared) = declared {
        let declared = ImageType::from_content_type(declared).ok_or(UploadError::InvalidFileType)?;
        if declared != detected {
            return Err(UploadError::InvalidFileType);
        }
    }

    Ok(detected)
}
