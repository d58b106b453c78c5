//! Payment verification rules for receipt uploads and admin decisions.
//!
//! Only bank-transfer orders carry receipts:
//!
//! ```text
//! Pending ──upload──▶ AwaitingVerification ──approve──▶ Verified
//!    ▲                        │
//!    │                     reject
//!    │                        ▼
//!    └──────── upload ─── Rejected
//! ```
//!
//! Cash-on-delivery orders never take a receipt; their payment is verified
//! by the lifecycle when the order is delivered.

use crate::lifecycle::OrderState;
use crate::types::{Actor, OrderStatus, PaymentMethod, PaymentStatus, ReceiptDecision};

/// Why a receipt upload or review was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PaymentRuleError {
    /// The order is not paid by bank transfer.
    #[error("this order does not take payment receipts")]
    WrongPaymentMethod,
    /// A receipt is already waiting for review.
    #[error("a receipt is already awaiting verification")]
    UploadInProgress,
    /// Payment is already verified.
    #[error("payment has already been verified")]
    AlreadyVerified,
    /// Nothing is waiting for review.
    #[error("no receipt is awaiting verification")]
    NoPendingReceipt,
    /// Rejections must say why.
    #[error("a reason is required when rejecting a receipt")]
    ReasonRequired,
    /// Cancelled orders take no new receipts.
    #[error("order has been cancelled")]
    OrderCancelled,
    /// Only admins review receipts.
    #[error("only administrators can review receipts")]
    Forbidden,
}

impl PaymentRuleError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::WrongPaymentMethod => "wrong_payment_method",
            Self::UploadInProgress => "upload_in_progress",
            Self::AlreadyVerified => "already_verified",
            Self::NoPendingReceipt => "no_pending_receipt",
            Self::ReasonRequired => "reason_required",
            Self::OrderCancelled => "order_cancelled",
            Self::Forbidden => "forbidden",
        }
    }
}

/// Check that the order can accept a new receipt.
///
/// Ownership is the caller's concern; this only looks at payment state.
///
/// # Errors
///
/// Returns the [`PaymentRuleError`] that blocks the upload.
pub const fn check_receipt_upload(order: &OrderState) -> Result<(), PaymentRuleError> {
    match order.payment_method {
        PaymentMethod::CashOnDelivery => return Err(PaymentRuleError::WrongPaymentMethod),
        PaymentMethod::BankTransfer => {}
    }

    match order.payment_status {
        PaymentStatus::AwaitingVerification => Err(PaymentRuleError::UploadInProgress),
        PaymentStatus::Verified => Err(PaymentRuleError::AlreadyVerified),
        PaymentStatus::Pending | PaymentStatus::Rejected => {
            if matches!(order.status, OrderStatus::Cancelled) {
                Err(PaymentRuleError::OrderCancelled)
            } else {
                Ok(())
            }
        }
    }
}

/// A validated review decision, ready to be written with compare-and-set on
/// `AwaitingVerification`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionPlan {
    pub decision: ReceiptDecision,
    /// Order payment status after the write.
    pub payment_status: PaymentStatus,
    /// Trimmed reason, present only for rejections.
    pub reason: Option<String>,
}

/// Decide the effect of an admin's verdict on the pending receipt.
///
/// # Errors
///
/// - [`PaymentRuleError::Forbidden`] if `actor` is not an admin
/// - [`PaymentRuleError::ReasonRequired`] for a rejection without a reason
/// - [`PaymentRuleError::NoPendingReceipt`] unless payment is awaiting verification
pub fn plan_decision(
    order: &OrderState,
    actor: &Actor,
    decision: ReceiptDecision,
    reason: Option<&str>,
) -> Result<DecisionPlan, PaymentRuleError> {
    if !actor.is_admin() {
        return Err(PaymentRuleError::Forbidden);
    }

    let reason = match decision {
        ReceiptDecision::Verified => None,
        ReceiptDecision::Rejected => {
            let reason = reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or(PaymentRuleError::ReasonRequired)?;
            Some(reason.to_owned())
        }
    };

    if order.payment_status != PaymentStatus::AwaitingVerification {
        return Err(PaymentRuleError::NoPendingReceipt);
    }

    let payment_status = match decision {
        ReceiptDecision::Verified => PaymentStatus::Verified,
        ReceiptDecision::Rejected => PaymentStatus::Rejected,
    };

    Ok(DecisionPlan {
        decision,
        payment_status,
        reason,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::AccountId;

    const ADMIN: Actor = Actor::Admin(AccountId::new(1));

    fn bank_transfer(payment_status: PaymentStatus) -> OrderState {
        OrderState {
            owner: AccountId::new(5),
            payment_method: PaymentMethod::BankTransfer,
            status: OrderStatus::Placed,
            payment_status,
        }
    }

    #[test]
    fn test_upload_allowed_from_pending_and_rejected() {
        assert!(check_receipt_upload(&bank_transfer(PaymentStatus::Pending)).is_ok());
        assert!(check_receipt_upload(&bank_transfer(PaymentStatus::Rejected)).is_ok());
    }

    #[test]
    fn test_upload_blocked_states() {
        assert_eq!(
            check_receipt_upload(&bank_transfer(PaymentStatus::AwaitingVerification)),
            Err(PaymentRuleError::UploadInProgress)
        );
        assert_eq!(
            check_receipt_upload(&bank_transfer(PaymentStatus::Verified)),
            Err(PaymentRuleError::AlreadyVerified)
        );
    }

    #[test]
    fn test_upload_on_cod_order() {
        let order = OrderState {
            payment_method: PaymentMethod::CashOnDelivery,
            ..bank_transfer(PaymentStatus::Pending)
        };
        assert_eq!(
            check_receipt_upload(&order),
            Err(PaymentRuleError::WrongPaymentMethod)
        );
    }

    #[test]
    fn test_upload_on_cancelled_order() {
        let order = OrderState {
            status: OrderStatus::Cancelled,
            ..bank_transfer(PaymentStatus::Pending)
        };
        assert_eq!(
            check_receipt_upload(&order),
            Err(PaymentRuleError::OrderCancelled)
        );
    }

    #[test]
    fn test_approve() {
        let plan = plan_decision(
            &bank_transfer(PaymentStatus::AwaitingVerification),
            &ADMIN,
            ReceiptDecision::Verified,
            Some("ignored"),
        )
        .unwrap();
        assert_eq!(plan.payment_status, PaymentStatus::Verified);
        assert_eq!(plan.reason, None);
    }

    #[test]
    fn test_reject_requires_reason() {
        let order = bank_transfer(PaymentStatus::AwaitingVerification);
        assert_eq!(
            plan_decision(&order, &ADMIN, ReceiptDecision::Rejected, None),
            Err(PaymentRuleError::ReasonRequired)
        );
        assert_eq!(
            plan_decision(&order, &ADMIN, ReceiptDecision::Rejected, Some("  ")),
            Err(PaymentRuleError::ReasonRequired)
        );

        let plan =
            plan_decision(&order, &ADMIN, ReceiptDecision::Rejected, Some(" illegible ")).unwrap();
        assert_eq!(plan.payment_status, PaymentStatus::Rejected);
        assert_eq!(plan.reason.as_deref(), Some("illegible"));
    }

    #[test]
    fn test_decision_needs_pending_receipt() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Verified,
            PaymentStatus::Rejected,
        ] {
            assert_eq!(
                plan_decision(&bank_transfer(status), &ADMIN, ReceiptDecision::Verified, None),
                Err(PaymentRuleError::NoPendingReceipt)
            );
        }
    }

    #[test]
    fn test_decision_requires_admin() {
        let order = bank_transfer(PaymentStatus::AwaitingVerification);
        for actor in [Actor::Customer(AccountId::new(5)), Actor::System] {
            assert_eq!(
                plan_decision(&order, &actor, ReceiptDecision::Verified, None),
                Err(PaymentRuleError::Forbidden)
            );
        }
    }
}
