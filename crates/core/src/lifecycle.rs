//! Order lifecycle transition table.
//!
//! Fulfilment moves `Placed → Processing → Shipped → Delivered`; an order can
//! also be cancelled while it is still `Placed` or `Processing`. Who may
//! request which edge, and under what guard, is decided here. Persisting the
//! result is the caller's job and must be keyed on the observed state.

use crate::types::{AccountId, Actor, OrderStatus, PaymentMethod, PaymentStatus};

/// Why a transition request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The edge is not in the transition table, or it moves backward.
    #[error("cannot move order from {from} to {to}")]
    IllegalTransition {
        from: OrderStatus,
        to: OrderStatus,
    },
    /// A bank-transfer order cannot be processed before its payment is verified.
    #[error("payment has not been verified")]
    PaymentNotVerified,
    /// Shipping needs a tracking reference.
    #[error("a tracking reference is required to ship")]
    TrackingReferenceRequired,
    /// A customer asked about someone else's order.
    #[error("order not found")]
    NotOwner,
    /// The actor's role may not request this edge.
    #[error("not allowed to change this order's status")]
    Forbidden,
}

impl LifecycleError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::PaymentNotVerified => "payment_not_verified",
            Self::TrackingReferenceRequired => "tracking_reference_required",
            Self::NotOwner => "not_owner",
            Self::Forbidden => "forbidden",
        }
    }
}

/// The parts of an order the lifecycle and payment rules look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderState {
    pub owner: AccountId,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

/// A validated transition, ready to be written with compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Payment status observed when planning; the write must match it.
    pub expected_payment_status: PaymentStatus,
    /// Payment status after the write.
    pub payment_status: PaymentStatus,
    /// Stored when shipping.
    pub tracking_reference: Option<String>,
}

/// Result of planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionPlan {
    /// The order is already in the requested status.
    NoOp,
    /// Apply this change.
    Apply(Transition),
}

/// Decide whether `actor` may move the order to `target`.
///
/// Authorization is checked first so that a customer cannot probe other
/// orders, then the same-status no-op, then the table and its guards.
///
/// # Errors
///
/// Returns a [`LifecycleError`] naming the first rule the request breaks.
pub fn plan_transition(
    state: &OrderState,
    actor: &Actor,
    target: OrderStatus,
    tracking_reference: Option<&str>,
) -> Result<TransitionPlan, LifecycleError> {
    authorize(state, actor, target)?;

    if state.status == target {
        return Ok(TransitionPlan::NoOp);
    }

    let from = state.status;
    let mut payment_status = state.payment_status;
    let mut tracking = None;

    match (from, target) {
        (OrderStatus::Placed, OrderStatus::Processing) => match state.payment_method {
            PaymentMethod::CashOnDelivery => {}
            PaymentMethod::BankTransfer => {
                if state.payment_status != PaymentStatus::Verified {
                    return Err(LifecycleError::PaymentNotVerified);
                }
            }
        },
        (OrderStatus::Processing, OrderStatus::Shipped) => {
            let reference = tracking_reference
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or(LifecycleError::TrackingReferenceRequired)?;
            tracking = Some(reference.to_owned());
        }
        (OrderStatus::Shipped, OrderStatus::Delivered) => match state.payment_method {
            PaymentMethod::CashOnDelivery => payment_status = PaymentStatus::Verified,
            PaymentMethod::BankTransfer => {}
        },
        (OrderStatus::Placed | OrderStatus::Processing, OrderStatus::Cancelled)
            if !matches!(actor, Actor::Customer(_)) || from == OrderStatus::Placed => {}
        _ => {
            return Err(LifecycleError::IllegalTransition { from, to: target });
        }
    }

    Ok(TransitionPlan::Apply(Transition {
        from,
        to: target,
        expected_payment_status: state.payment_status,
        payment_status,
        tracking_reference: tracking,
    }))
}

fn authorize(state: &OrderState, actor: &Actor, target: OrderStatus) -> Result<(), LifecycleError> {
    match actor {
        Actor::Admin(_) => Ok(()),
        Actor::System => {
            if target == OrderStatus::Processing {
                Ok(())
            } else {
                Err(LifecycleError::Forbidden)
            }
        }
        Actor::Customer(id) => {
            if *id != state.owner {
                return Err(LifecycleError::NotOwner);
            }
            if target == OrderStatus::Cancelled {
                Ok(())
            } else {
                Err(LifecycleError::Forbidden)
            }
        }
    }
}
