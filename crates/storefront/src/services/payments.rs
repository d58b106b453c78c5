//! Payment verification service.
//!
//! Receipt uploads move a bank-transfer order to `AwaitingVerification`;
//! an admin decision moves it on to `Verified` or `Rejected`. Both writes
//! are keyed on the payment status they were planned from, so an upload
//! and a decision racing on one order resolve to one winner.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use boxlane_core::{
    Actor, BlobRef, BlobStore, BlobStoreError, Clock, OrderId, PaymentRuleError,
    ReceiptDecision, UploadError, check_receipt_upload, plan_decision, validate_receipt_image,
};

use super::MAX_CAS_RETRIES;
use super::orders::visible_to;
use crate::db::{OrderRepository, RepositoryError};
use crate::models::{NewReceipt, Order, Receipt, ReceiptReview};

/// Errors from receipt uploads and reviews.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Rule(#[from] PaymentRuleError),

    #[error("order not found")]
    OrderNotFound,

    /// Only the order's owner may upload proof of payment.
    #[error("order not found")]
    NotOwner,

    #[error("receipt storage failed: {0}")]
    Storage(#[from] BlobStoreError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl PaymentError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Upload(e) => e.code(),
            Self::Rule(e) => e.code(),
            Self::OrderNotFound => "order_not_found",
            Self::NotOwner => "not_owner",
            Self::Storage(_) | Self::Repository(_) => "internal_error",
        }
    }
}

/// Receipt uploads and admin review.
#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<dyn OrderRepository>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    max_receipt_bytes: usize,
}

impl PaymentService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        max_receipt_bytes: usize,
    ) -> Self {
        Self {
            orders,
            blobs,
            clock,
            max_receipt_bytes,
        }
    }

    async fn load(&self, order_id: OrderId) -> Result<Order, PaymentError> {
        self.orders
            .order_by_id(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound)
    }

    /// Attach proof of payment to a bank-transfer order.
    ///
    /// The file is checked before any order state is read. The image is
    /// stored once, even if the attach has to be retried.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Upload` for a disallowed or oversized file,
    /// `PaymentError::NotOwner` unless the actor owns the order, and
    /// `PaymentError::Rule` when the order's payment state takes no upload.
    #[instrument(skip(self, content_type, bytes), fields(actor = %actor, order_id = %order_id, size = bytes.len()))]
    pub async fn upload_receipt(
        &self,
        actor: &Actor,
        order_id: OrderId,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<Receipt, PaymentError> {
        let image_type = validate_receipt_image(content_type, bytes, self.max_receipt_bytes)?;
        let mut stored: Option<BlobRef> = None;

        for _ in 0..MAX_CAS_RETRIES {
            let order = self.load(order_id).await?;
            let Some(uploader) = actor.account_id().filter(|id| *id == order.account_id) else {
                return Err(PaymentError::NotOwner);
            };
            check_receipt_upload(&order.state())?;

            let blob_ref = match &stored {
                Some(blob_ref) => blob_ref.clone(),
                None => {
                    let blob_ref = self.blobs.store(bytes, image_type).await?;
                    stored = Some(blob_ref.clone());
                    blob_ref
                }
            };

            let receipt = NewReceipt {
                order_id,
                blob_ref,
                image_type,
                uploaded_by: uploader,
                uploaded_at: self.clock.now(),
            };
            if let Some(receipt) = self
                .orders
                .attach_receipt(&receipt, order.status, order.payment_status)
                .await?
            {
                info!(
                    receipt_id = %receipt.id,
                    previous_payment_status = %order.payment_status,
                    "Receipt uploaded"
                );
                return Ok(receipt);
            }
        }

        Err(RepositoryError::Conflict(format!("order {order_id} kept changing")).into())
    }

    /// Record an admin's verdict on the receipt awaiting review.
    ///
    /// # Errors
    ///
    /// Returns `PaymentRuleError::Forbidden` for non-admins,
    /// `PaymentRuleError::ReasonRequired` for a rejection without a reason,
    /// and `PaymentRuleError::NoPendingReceipt` when nothing awaits review
    /// (including when a concurrent review got there first).
    #[instrument(skip(self, reason), fields(actor = %actor, order_id = %order_id, decision = %decision))]
    pub async fn review(
        &self,
        actor: &Actor,
        order_id: OrderId,
        decision: ReceiptDecision,
        reason: Option<&str>,
    ) -> Result<Receipt, PaymentError> {
        let Actor::Admin(reviewer_id) = *actor else {
            return Err(PaymentRuleError::Forbidden.into());
        };

        for _ in 0..MAX_CAS_RETRIES {
            let order = self.load(order_id).await?;
            let plan = plan_decision(&order.state(), actor, decision, reason)?;

            let review = ReceiptReview {
                order_id,
                reviewer_id,
                decision: plan.decision,
                reason: plan.reason,
                payment_status: plan.payment_status,
                reviewed_at: self.clock.now(),
            };
            if let Some(receipt) = self.orders.record_review(&review).await? {
                info!(
                    receipt_id = %receipt.id,
                    payment_status = %review.payment_status,
                    "Receipt reviewed"
                );
                return Ok(receipt);
            }
        }

        Err(RepositoryError::Conflict(format!("order {order_id} kept changing")).into())
    }

    /// Receipt history for an order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::OrderNotFound` unless the actor owns the order
    /// or is an admin.
    pub async fn receipts(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Vec<Receipt>, PaymentError> {
        let order = self.load(order_id).await?;
        if !visible_to(actor, &order) {
            return Err(PaymentError::OrderNotFound);
        }
        Ok(self.orders.receipts_for_order(order_id).await?)
    }

    /// Orders with a receipt awaiting review, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `PaymentRuleError::Forbidden` for non-admins.
    pub async fn pending_reviews(&self, actor: &Actor) -> Result<Vec<Order>, PaymentError> {
        if !actor.is_admin() {
            return Err(PaymentRuleError::Forbidden.into());
        }
        Ok(self.orders.orders_awaiting_verification().await?)
    }
}
