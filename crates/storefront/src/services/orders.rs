//! Order lifecycle service.
//!
//! Plans each status change with [`boxlane_core::plan_transition`] and
//! writes it keyed on the status and payment status it was planned from.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use boxlane_core::{
    Actor, Clock, LifecycleError, OrderId, OrderStatus, TransitionPlan, plan_transition,
};

use super::MAX_CAS_RETRIES;
use crate::db::{OrderRepository, RepositoryError};
use crate::models::Order;

/// Errors from order reads and status changes.
#[derive(Debug, Error)]
pub enum OrderError {
    /// No such order, or not one the actor may see.
    #[error("order not found")]
    OrderNotFound,

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl OrderError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OrderNotFound => "order_not_found",
            Self::Lifecycle(e) => e.code(),
            Self::Repository(_) => "internal_error",
        }
    }
}

/// Whether `actor` may read `order`.
pub(crate) fn visible_to(actor: &Actor, order: &Order) -> bool {
    match actor {
        Actor::Customer(id) => order.account_id == *id,
        Actor::Admin(_) | Actor::System => true,
    }
}

/// Order reads and status transitions.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    clock: Arc<dyn Clock>,
}

impl OrderService {
    #[must_use]
    pub fn new(orders: Arc<dyn OrderRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { orders, clock }
    }

    /// Load an order the actor may see.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::OrderNotFound` for missing orders and for other
    /// customers' orders alike.
    pub async fn get_order(&self, actor: &Actor, id: OrderId) -> Result<Order, OrderError> {
        let order = self
            .orders
            .order_by_id(id)
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        if !visible_to(actor, &order) {
            return Err(OrderError::OrderNotFound);
        }
        Ok(order)
    }

    /// Orders placed by the acting account, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list_orders(&self, actor: &Actor) -> Result<Vec<Order>, OrderError> {
        let Some(account_id) = actor.account_id() else {
            return Ok(Vec::new());
        };
        Ok(self.orders.orders_for_account(account_id).await?)
    }

    /// Move an order to `target`.
    ///
    /// Re-requesting the current status succeeds without a write.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Lifecycle` when the actor may not request the
    /// edge, the edge is not in the table, or its guard fails.
    #[instrument(skip(self, tracking_reference), fields(actor = %actor, order_id = %id, to = %target))]
    pub async fn transition(
        &self,
        actor: &Actor,
        id: OrderId,
        target: OrderStatus,
        tracking_reference: Option<&str>,
    ) -> Result<Order, OrderError> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut order = self
                .orders
                .order_by_id(id)
                .await?
                .ok_or(OrderError::OrderNotFound)?;

            let transition = match plan_transition(&order.state(), actor, target, tracking_reference)?
            {
                TransitionPlan::NoOp => return Ok(order),
                TransitionPlan::Apply(transition) => transition,
            };

            let now = self.clock.now();
            if !self.orders.apply_transition(id, &transition, now).await? {
                continue;
            }

            info!(
                from = %transition.from,
                payment_status = %transition.payment_status,
                "Order status changed"
            );

            order.status = transition.to;
            order.payment_status = transition.payment_status;
            if transition.tracking_reference.is_some() {
                order.tracking_reference = transition.tracking_reference;
            }
            order.updated_at = now;
            return Ok(order);
        }

        Err(RepositoryError::Conflict(format!("order {id} kept changing")).into())
    }

    /// Cancel an order.
    ///
    /// # Errors
    ///
    /// Same as [`OrderService::transition`].
    pub async fn cancel(&self, actor: &Actor, id: OrderId) -> Result<Order, OrderError> {
        self.transition(actor, id, OrderStatus::Cancelled, None)
            .await
    }
}
