//! Multipart helpers shared by the checkout and receipt endpoints.

use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;

use boxlane_core::UploadError;

use crate::error::AppError;
use crate::services::{PaymentError, ReceiptFile};

/// Form field carrying the receipt image.
pub const RECEIPT_FIELD: &str = "receipt";

/// Read a receipt image field into memory.
///
/// A body cut off by the request size limit is reported as an oversized
/// receipt rather than a malformed form.
///
/// # Errors
///
/// Returns `AppError` if the field cannot be read.
pub async fn read_receipt(field: Field<'_>, max_bytes: usize) -> Result<ReceiptFile, AppError> {
    let content_type = field.content_type().map(str::to_owned);
    let bytes = field
        .bytes()
        .await
        .map_err(|e| multipart_error(&e, max_bytes))?;

    Ok(ReceiptFile {
        content_type,
        bytes: bytes.to_vec(),
    })
}

/// Map a multipart read failure to an API error.
pub fn multipart_error(error: &MultipartError, max_bytes: usize) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return PaymentError::Upload(UploadError::FileTooLarge { max_bytes }).into();
    }
    AppError::BadRequest(error.body_text())
}
