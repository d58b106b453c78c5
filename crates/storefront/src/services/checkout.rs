//! Checkout orchestrator.
//!
//! Turns a cart into an order: validates the cart, requires a verified
//! account, freezes catalog prices into line items, creates the order, and
//! optionally attaches a receipt. A failed receipt never undoes the order.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use boxlane_core::{
    AccountId, Actor, Clock, PaymentMethod, PaymentStatus, Price, ProductId,
};

use super::accounts::{AccountError, AccountService};
use super::payments::{PaymentError, PaymentService};
use crate::db::{CatalogRepository, OrderRepository, RepositoryError};
use crate::models::{LineItem, NewOrder, Order, Product, Receipt, ShippingAddress};

/// One cart line as submitted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Everything needed to place an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CartLine>,
    pub shipping: ShippingAddress,
    pub payment_method: PaymentMethod,
}

/// Proof of payment submitted together with the cart.
#[derive(Debug, Clone)]
pub struct ReceiptFile {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A placed order, plus the outcome of the optional receipt upload.
#[derive(Debug)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub receipt: Option<Receipt>,
    pub receipt_error: Option<PaymentError>,
}

/// Errors that stop an order from being created.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    #[error("unknown product {product_id}")]
    UnknownProduct { product_id: ProductId },

    #[error("invalid shipping address: {field}")]
    InvalidShipping { field: &'static str },

    #[error(transparent)]
    Account(#[from] AccountError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl CheckoutError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyCart => "empty_cart",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::UnknownProduct { .. } => "unknown_product",
            Self::InvalidShipping { .. } => "invalid_shipping",
            Self::Account(e) => e.code(),
            Self::Repository(_) => "internal_error",
        }
    }
}

/// Merge duplicate product lines, keeping first-seen order.
fn merge_lines(lines: &[CartLine]) -> Result<Vec<(ProductId, u32)>, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut merged: Vec<(ProductId, u32)> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(CheckoutError::InvalidQuantity {
                product_id: line.product_id,
            });
        }

        match merged.iter_mut().find(|(id, _)| *id == line.product_id) {
            Some((_, quantity)) => {
                *quantity = quantity.checked_add(line.quantity).ok_or(
                    CheckoutError::InvalidQuantity {
                        product_id: line.product_id,
                    },
                )?;
            }
            None => merged.push((line.product_id, line.quantity)),
        }
    }

    Ok(merged)
}

/// Places orders.
#[derive(Clone)]
pub struct CheckoutService {
    accounts: AccountService,
    payments: PaymentService,
    catalog: Arc<dyn CatalogRepository>,
    orders: Arc<dyn OrderRepository>,
    clock: Arc<dyn Clock>,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        accounts: AccountService,
        payments: PaymentService,
        catalog: Arc<dyn CatalogRepository>,
        orders: Arc<dyn OrderRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            payments,
            catalog,
            orders,
            clock,
        }
    }

    /// Place an order for `account_id`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError` for an invalid cart or shipping address, an
    /// unverified account, or an unknown product. Receipt failures are
    /// reported in [`CheckoutOutcome::receipt_error`] instead.
    #[instrument(skip(self, request, receipt), fields(account_id = %account_id, payment_method = %request.payment_method))]
    pub async fn checkout(
        &self,
        account_id: AccountId,
        request: CheckoutRequest,
        receipt: Option<ReceiptFile>,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let lines = merge_lines(&request.items)?;
        let shipping = request
            .shipping
            .normalized()
            .map_err(|field| CheckoutError::InvalidShipping { field })?;

        self.accounts.require_verified(account_id).await?;

        let ids: Vec<ProductId> = lines.iter().map(|(id, _)| *id).collect();
        let products: HashMap<ProductId, Product> = self
            .catalog
            .products_by_ids(&ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();

        let items = lines
            .iter()
            .map(|(product_id, quantity)| {
                products
                    .get(product_id)
                    .filter(|product| product.active)
                    .map(|product| LineItem::snapshot(product, *quantity))
                    .ok_or(CheckoutError::UnknownProduct {
                        product_id: *product_id,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let total: Price = items.iter().map(|item| item.line_total).sum();

        let mut order = self
            .orders
            .create_order(&NewOrder {
                account_id,
                items,
                shipping,
                payment_method: request.payment_method,
                total,
                created_at: self.clock.now(),
            })
            .await?;

        info!(order_id = %order.id, total = %order.total, "Order placed");

        let Some(file) = receipt else {
            return Ok(CheckoutOutcome {
                order,
                receipt: None,
                receipt_error: None,
            });
        };

        let actor = Actor::Customer(account_id);
        match self
            .payments
            .upload_receipt(&actor, order.id, file.content_type.as_deref(), &file.bytes)
            .await
        {
            Ok(receipt) => {
                order.payment_status = PaymentStatus::AwaitingVerification;
                order.updated_at = receipt.uploaded_at;
                Ok(CheckoutOutcome {
                    order,
                    receipt: Some(receipt),
                    receipt_error: None,
                })
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Receipt upload at checkout failed");
                Ok(CheckoutOutcome {
                    order,
                    receipt: None,
                    receipt_error: Some(e),
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(id: i32, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            quantity,
        }
    }

    #[test]
    fn test_merge_lines_combines_duplicates() {
        let merged = merge_lines(&[line(2, 1), line(5, 2), line(2, 3)]).unwrap();
        assert_eq!(
            merged,
            vec![(ProductId::new(2), 4), (ProductId::new(5), 2)]
        );
    }

    #[test]
    fn test_merge_lines_rejects_bad_carts() {
        assert!(matches!(merge_lines(&[]), Err(CheckoutError::EmptyCart)));
        assert!(matches!(
            merge_lines(&[line(1, 1), line(3, 0)]),
            Err(CheckoutError::InvalidQuantity { product_id }) if product_id == ProductId::new(3)
        ));
        assert!(matches!(
            merge_lines(&[line(1, u32::MAX), line(1, 1)]),
            Err(CheckoutError::InvalidQuantity { .. })
        ));
    }
}
