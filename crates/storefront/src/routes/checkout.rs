//! Checkout route handler.
//!
//! `POST /api/checkout` takes a multipart form: a `checkout` part holding
//! the JSON request and an optional `receipt` image. A rejected receipt
//! still places the order; the rejection is reported next to it.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::error::{AppError, ErrorBody};
use crate::middleware::RequireAccount;
use crate::models::{Order, Receipt};
use crate::services::{CheckoutOutcome, CheckoutRequest, ReceiptFile};
use crate::state::AppState;

use super::upload::{RECEIPT_FIELD, multipart_error, read_receipt};

/// Form field carrying the JSON checkout request.
const CHECKOUT_FIELD: &str = "checkout";

/// Placed order with the outcome of its receipt upload.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    pub receipt: Option<Receipt>,
    pub receipt_error: Option<ErrorBody>,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        Self {
            order: outcome.order,
            receipt: outcome.receipt,
            receipt_error: outcome
                .receipt_error
                .map(|e| AppError::from(e).body()),
        }
    }
}

/// Place an order from the cart in the form.
pub async fn checkout(
    State(state): State<AppState>,
    RequireAccount(account): RequireAccount,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let max_bytes = state.config().receipts.max_bytes;
    let mut request: Option<CheckoutRequest> = None;
    let mut receipt: Option<ReceiptFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e, max_bytes))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(CHECKOUT_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(&e, max_bytes))?;
                let parsed = serde_json::from_str(&text)
                    .map_err(|e| AppError::BadRequest(format!("invalid checkout request: {e}")))?;
                request = Some(parsed);
            }
            Some(RECEIPT_FIELD) => receipt = Some(read_receipt(field, max_bytes).await?),
            _ => {}
        }
    }

    let request = request
        .ok_or_else(|| AppError::BadRequest(format!("missing '{CHECKOUT_FIELD}' field")))?;

    let outcome = state
        .services()
        .checkout
        .checkout(account.id, request, receipt)
        .await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}
