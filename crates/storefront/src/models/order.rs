//! Order, receipt, and catalog domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boxlane_core::{
    AccountId, BlobRef, ImageType, OrderId, OrderState, OrderStatus, PaymentMethod,
    PaymentStatus, Price, ProductId, ReceiptDecision, ReceiptId,
};

/// A sellable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    /// Stable key used by catalog seeding.
    pub slug: String,
    pub title: String,
    /// Current unit price. Orders copy this at checkout.
    pub price: Price,
    /// Inactive products cannot be ordered.
    pub active: bool,
}

/// Catalog entry to insert or update, keyed by slug.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductUpsert {
    pub slug: String,
    pub title: String,
    pub price: Price,
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2, upper case.
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ShippingAddress {
    /// Trim every field, drop blank optionals, and upper-case the country.
    ///
    /// # Errors
    ///
    /// Returns the name of the first missing or malformed field.
    pub fn normalized(self) -> Result<Self, &'static str> {
        fn required(value: String, field: &'static str) -> Result<String, &'static str> {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(field)
            } else {
                Ok(trimmed.to_owned())
            }
        }

        fn optional(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        }

        let country_code = required(self.country_code, "country_code")?.to_ascii_uppercase();
        if country_code.len() != 2 || !country_code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err("country_code");
        }

        Ok(Self {
            recipient: required(self.recipient, "recipient")?,
            line1: required(self.line1, "line1")?,
            line2: optional(self.line2),
            city: required(self.city, "city")?,
            region: optional(self.region),
            postal_code: required(self.postal_code, "postal_code")?,
            country_code,
            phone: optional(self.phone),
        })
    }
}

/// One line of an order, frozen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Price,
    pub line_total: Price,
}

impl LineItem {
    /// Snapshot a product at its current price.
    #[must_use]
    pub fn snapshot(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            title: product.title.clone(),
            quantity,
            unit_price: product.price,
            line_total: product.price.times(quantity),
        }
    }
}

/// A customer order (domain type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub items: Vec<LineItem>,
    pub shipping: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Sum of line totals, computed once at creation.
    pub total: Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The fields the workflow rules look at.
    #[must_use]
    pub const fn state(&self) -> OrderState {
        OrderState {
            owner: self.account_id,
            payment_method: self.payment_method,
            status: self.status,
            payment_status: self.payment_status,
        }
    }
}

/// Everything needed to insert an order.
///
/// Status and payment status are not part of this: every order starts
/// `Placed` / `Pending`.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub account_id: AccountId,
    pub items: Vec<LineItem>,
    pub shipping: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub total: Price,
    pub created_at: DateTime<Utc>,
}

/// An uploaded proof of payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub order_id: OrderId,
    pub blob_ref: BlobRef,
    pub image_type: ImageType,
    pub uploaded_by: AccountId,
    pub uploaded_at: DateTime<Utc>,
    /// `None` while awaiting review.
    pub decision: Option<ReceiptDecision>,
    pub rejection_reason: Option<String>,
    pub reviewer_id: Option<AccountId>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Receipt {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.decision.is_none()
    }
}

/// Receipt row to insert alongside the payment status change.
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub order_id: OrderId,
    pub blob_ref: BlobRef,
    pub image_type: ImageType,
    pub uploaded_by: AccountId,
    pub uploaded_at: DateTime<Utc>,
}

/// A review decision to record against the active receipt.
#[derive(Debug, Clone)]
pub struct ReceiptReview {
    pub order_id: OrderId,
    pub reviewer_id: AccountId,
    pub decision: ReceiptDecision,
    pub reason: Option<String>,
    /// Order payment status after the review.
    pub payment_status: PaymentStatus,
    pub reviewed_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            recipient: "  Ada Lovelace ".to_string(),
            line1: "12 Crate Lane".to_string(),
            line2: Some("   ".to_string()),
            city: "Leeds".to_string(),
            region: None,
            postal_code: "LS1 4AP".to_string(),
            country_code: "gb".to_string(),
            phone: None,
        }
    }

    #[test]
    fn test_shipping_normalized() {
        let normalized = address().normalized().unwrap();
        assert_eq!(normalized.recipient, "Ada Lovelace");
        assert_eq!(normalized.line2, None);
        assert_eq!(normalized.country_code, "GB");
    }

    #[test]
    fn test_shipping_missing_fields() {
        let mut a = address();
        a.city = " ".to_string();
        assert_eq!(a.normalized(), Err("city"));

        let mut a = address();
        a.country_code = "GBR".to_string();
        assert_eq!(a.normalized(), Err("country_code"));
    }

    #[test]
    fn test_line_item_snapshot() {
        let product = Product {
            id: ProductId::new(4),
            slug: "snack-box".to_string(),
            title: "Snack Box".to_string(),
            price: Price::from_cents(1999).unwrap(),
            active: true,
        };
        let item = LineItem::snapshot(&product, 3);
        assert_eq!(item.line_total, Price::from_cents(5997).unwrap());
        assert_eq!(item.title, "Snack Box");
    }
}
