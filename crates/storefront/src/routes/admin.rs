//! Admin route handlers: payment review and fulfilment.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use boxlane_core::{OrderId, OrderStatus, ReceiptDecision};

use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{Order, Receipt};
use crate::state::AppState;

/// Requested status change.
#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: OrderStatus,
    pub tracking_reference: Option<String>,
}

/// Verdict on the receipt awaiting review.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReceiptDecision,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub orders: Vec<Order>,
}

/// Orders with a receipt awaiting review, oldest first.
pub async fn pending_payments(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<PendingResponse>, AppError> {
    let orders = state
        .services()
        .payments
        .pending_reviews(&admin.actor())
        .await?;
    Ok(Json(PendingResponse { orders }))
}

/// Move an order along the fulfilment lifecycle.
pub async fn change_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusChangeRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .services()
        .orders
        .transition(
            &admin.actor(),
            id,
            body.status,
            body.tracking_reference.as_deref(),
        )
        .await?;
    Ok(Json(order))
}

/// Approve or reject the receipt awaiting review.
pub async fn review_payment(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<Receipt>, AppError> {
    let receipt = state
        .services()
        .payments
        .review(&admin.actor(), id, body.decision, body.reason.as_deref())
        .await?;
    Ok(Json(receipt))
}
