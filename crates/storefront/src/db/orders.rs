//! Order and receipt repository.
//!
//! Line items are stored in `order_item` keyed by position so an order
//! reads back in the order it was placed.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use boxlane_core::{
    AccountId, BlobRef, ImageType, OrderId, OrderStatus, PaymentMethod, PaymentStatus, Price,
    ProductId, ReceiptDecision, ReceiptId, Transition,
};

use super::{OrderRepository, RepositoryError, conflict_on_unique, to_i32, to_u32};
use crate::models::{
    LineItem, NewOrder, NewReceipt, Order, Receipt, ReceiptReview, ShippingAddress,
};

fn price(amount: Decimal, column: &str) -> Result<Price, RepositoryError> {
    Price::new(amount)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {amount}")))
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    account_id: AccountId,
    payment_method: PaymentMethod,
    status: OrderStatus,
    payment_status: PaymentStatus,
    total: Decimal,
    tracking_reference: Option<String>,
    ship_recipient: String,
    ship_line1: String,
    ship_line2: Option<String>,
    ship_city: String,
    ship_region: Option<String>,
    ship_postal_code: String,
    ship_country_code: String,
    ship_phone: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<LineItem>) -> Result<Order, RepositoryError> {
        Ok(Order {
            id: self.id,
            account_id: self.account_id,
            items,
            shipping: ShippingAddress {
                recipient: self.ship_recipient,
                line1: self.ship_line1,
                line2: self.ship_line2,
                city: self.ship_city,
                region: self.ship_region,
                postal_code: self.ship_postal_code,
                country_code: self.ship_country_code,
                phone: self.ship_phone,
            },
            payment_method: self.payment_method,
            status: self.status,
            payment_status: self.payment_status,
            total: price(self.total, "total")?,
            tracking_reference: self.tracking_reference,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_id: OrderId,
    product_id: ProductId,
    title: String,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

impl TryFrom<ItemRow> for LineItem {
    type Error = RepositoryError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: row.product_id,
            title: row.title,
            quantity: to_u32(row.quantity, "quantity")?,
            unit_price: price(row.unit_price, "unit_price")?,
            line_total: price(row.line_total, "line_total")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReceiptRow {
    id: ReceiptId,
    order_id: OrderId,
    blob_ref: String,
    content_type: String,
    uploaded_by: AccountId,
    uploaded_at: DateTime<Utc>,
    decision: Option<ReceiptDecision>,
    rejection_reason: Option<String>,
    reviewer_id: Option<AccountId>,
    reviewed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReceiptRow> for Receipt {
    type Error = RepositoryError;

    fn try_from(row: ReceiptRow) -> Result<Self, Self::Error> {
        let image_type = ImageType::from_content_type(&row.content_type).ok_or_else(|| {
            RepositoryError::DataCorruption(format!(
                "unknown receipt content type: {}",
                row.content_type
            ))
        })?;

        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            blob_ref: BlobRef::new(row.blob_ref),
            image_type,
            uploaded_by: row.uploaded_by,
            uploaded_at: row.uploaded_at,
            decision: row.decision,
            rejection_reason: row.rejection_reason,
            reviewer_id: row.reviewer_id,
            reviewed_at: row.reviewed_at,
        })
    }
}

const ORDER_COLUMNS: &str = r"
    id, account_id, payment_method, status, payment_status, total, tracking_reference,
    ship_recipient, ship_line1, ship_line2, ship_city, ship_region, ship_postal_code,
    ship_country_code, ship_phone, created_at, updated_at
";

const RECEIPT_COLUMNS: &str = r"
    id, order_id, blob_ref, content_type, uploaded_by, uploaded_at,
    decision, rejection_reason, reviewer_id, reviewed_at
";

/// `PostgreSQL` order storage.
#[derive(Clone)]
pub struct PgOrders {
    pool: PgPool,
}

impl PgOrders {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach line items to a batch of order rows, preserving row order.
    async fn with_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();
        let item_rows = sqlx::query_as::<_, ItemRow>(
            r"
            SELECT order_id, product_id, title, quantity, unit_price, line_total
            FROM storefront.order_item
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<LineItem>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            items.entry(order_id).or_default().push(row.try_into()?);
        }

        rows.into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect()
    }

    async fn active_receipt_update(
        tx: &mut Transaction<'_, Postgres>,
        review: &ReceiptReview,
    ) -> Result<Option<ReceiptRow>, RepositoryError> {
        let row = sqlx::query_as::<_, ReceiptRow>(&format!(
            r"
            UPDATE storefront.receipt
            SET decision = $2, rejection_reason = $3, reviewer_id = $4, reviewed_at = $5
            WHERE order_id = $1 AND decision IS NULL
            RETURNING {RECEIPT_COLUMNS}
            "
        ))
        .bind(review.order_id)
        .bind(review.decision)
        .bind(review.reason.as_deref())
        .bind(review.reviewer_id)
        .bind(review.reviewed_at)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row)
    }
}

#[async_trait]
impl OrderRepository for PgOrders {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO storefront.customer_order
                (account_id, payment_method, total,
                 ship_recipient, ship_line1, ship_line2, ship_city, ship_region,
                 ship_postal_code, ship_country_code, ship_phone, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.account_id)
        .bind(order.payment_method)
        .bind(order.total.amount())
        .bind(&order.shipping.recipient)
        .bind(&order.shipping.line1)
        .bind(order.shipping.line2.as_deref())
        .bind(&order.shipping.city)
        .bind(order.shipping.region.as_deref())
        .bind(&order.shipping.postal_code)
        .bind(&order.shipping.country_code)
        .bind(order.shipping.phone.as_deref())
        .bind(order.created_at)
        .fetch_one(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| {
                RepositoryError::DataCorruption("too many line items".to_owned())
            })?;

            sqlx::query(
                r"
                INSERT INTO storefront.order_item
                    (order_id, position, product_id, title, quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(row.id)
            .bind(position)
            .bind(item.product_id)
            .bind(&item.title)
            .bind(to_i32(item.quantity, "quantity")?)
            .bind(item.unit_price.amount())
            .bind(item.line_total.amount())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        row.into_order(order.items.clone())
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(self.with_items(vec![row]).await?.pop())
    }

    async fn orders_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM storefront.customer_order
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_items(rows).await
    }

    async fn orders_awaiting_verification(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM storefront.customer_order
            WHERE payment_status = 'awaiting_verification'
            ORDER BY updated_at ASC, id ASC
            "
        ))
        .fetch_all(&self.pool)
        .await?;

        self.with_items(rows).await
    }

    async fn apply_transition(
        &self,
        id: OrderId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.customer_order
            SET status = $4,
                payment_status = $5,
                tracking_reference = COALESCE($6, tracking_reference),
                updated_at = $7
            WHERE id = $1 AND status = $2 AND payment_status = $3
            ",
        )
        .bind(id)
        .bind(transition.from)
        .bind(transition.expected_payment_status)
        .bind(transition.to)
        .bind(transition.payment_status)
        .bind(transition.tracking_reference.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn attach_receipt(
        &self,
        receipt: &NewReceipt,
        expected_status: OrderStatus,
        expected_payment_status: PaymentStatus,
    ) -> Result<Option<Receipt>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE storefront.customer_order
            SET payment_status = 'awaiting_verification', updated_at = $4
            WHERE id = $1 AND status = $2 AND payment_status = $3
            ",
        )
        .bind(receipt.order_id)
        .bind(expected_status)
        .bind(expected_payment_status)
        .bind(receipt.uploaded_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        let inserted = sqlx::query_as::<_, ReceiptRow>(&format!(
            r"
            INSERT INTO storefront.receipt
                (order_id, blob_ref, content_type, uploaded_by, uploaded_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECEIPT_COLUMNS}
            "
        ))
        .bind(receipt.order_id)
        .bind(receipt.blob_ref.as_str())
        .bind(receipt.image_type.content_type())
        .bind(receipt.uploaded_by)
        .bind(receipt.uploaded_at)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) => {
                return match conflict_on_unique(e, "receipt already awaiting review") {
                    RepositoryError::Conflict(_) => Ok(None),
                    other => Err(other),
                };
            }
        };

        tx.commit().await?;

        row.try_into().map(Some)
    }

    async fn record_review(
        &self,
        review: &ReceiptReview,
    ) -> Result<Option<Receipt>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE storefront.customer_order
            SET payment_status = $2, updated_at = $3
            WHERE id = $1 AND payment_status = 'awaiting_verification'
            ",
        )
        .bind(review.order_id)
        .bind(review.payment_status)
        .bind(review.reviewed_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        let Some(row) = Self::active_receipt_update(&mut tx, review).await? else {
            return Err(RepositoryError::DataCorruption(format!(
                "order {} awaiting verification without an active receipt",
                review.order_id
            )));
        };

        tx.commit().await?;

        row.try_into().map(Some)
    }

    async fn receipts_for_order(&self, order_id: OrderId) -> Result<Vec<Receipt>, RepositoryError> {
        let rows = sqlx::query_as::<_, ReceiptRow>(&format!(
            r"
            SELECT {RECEIPT_COLUMNS}
            FROM storefront.receipt
            WHERE order_id = $1
            ORDER BY uploaded_at ASC, id ASC
            "
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
