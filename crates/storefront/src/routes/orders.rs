//! Customer order route handlers.
//!
//! Orders belonging to someone else answer exactly like missing ones.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use serde::Serialize;

use boxlane_core::OrderId;

use crate::error::AppError;
use crate::middleware::RequireAccount;
use crate::models::{Order, Receipt};
use crate::services::ReceiptFile;
use crate::state::AppState;

use super::upload::{RECEIPT_FIELD, multipart_error, read_receipt};

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptsResponse {
    pub receipts: Vec<Receipt>,
}

/// The caller's orders, newest first.
pub async fn list(
    State(state): State<AppState>,
    RequireAccount(account): RequireAccount,
) -> Result<Json<OrdersResponse>, AppError> {
    let orders = state
        .services()
        .orders
        .list_orders(&account.actor())
        .await?;
    Ok(Json(OrdersResponse { orders }))
}

/// One order.
pub async fn show(
    State(state): State<AppState>,
    RequireAccount(account): RequireAccount,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .services()
        .orders
        .get_order(&account.actor(), id)
        .await?;
    Ok(Json(order))
}

/// Cancel an order.
pub async fn cancel(
    State(state): State<AppState>,
    RequireAccount(account): RequireAccount,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .services()
        .orders
        .cancel(&account.actor(), id)
        .await?;
    Ok(Json(order))
}

/// Receipt history for an order, oldest first.
pub async fn receipts(
    State(state): State<AppState>,
    RequireAccount(account): RequireAccount,
    Path(id): Path<OrderId>,
) -> Result<Json<ReceiptsResponse>, AppError> {
    let receipts = state
        .services()
        .payments
        .receipts(&account.actor(), id)
        .await?;
    Ok(Json(ReceiptsResponse { receipts }))
}

/// Upload proof of payment for a bank-transfer order.
pub async fn upload_receipt(
    State(state): State<AppState>,
    RequireAccount(account): RequireAccount,
    Path(id): Path<OrderId>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Receipt>), AppError> {
    let max_bytes = state.config().receipts.max_bytes;
    let mut file: Option<ReceiptFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e, max_bytes))?
    {
        if field.name() == Some(RECEIPT_FIELD) {
            file = Some(read_receipt(field, max_bytes).await?);
        }
    }

    let file = file.ok_or_else(|| AppError::BadRequest(format!("missing '{RECEIPT_FIELD}' field")))?;

    let receipt = state
        .services()
        .payments
        .upload_receipt(
            &account.actor(),
            id,
            file.content_type.as_deref(),
            &file.bytes,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}
