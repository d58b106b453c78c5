//! Catalog repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use boxlane_core::{Price, ProductId};

use super::{CatalogRepository, RepositoryError};
use crate::models::{Product, ProductUpsert};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    slug: String,
    title: String,
    price: Decimal,
    active: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let price = Price::new(row.price).map_err(|_| {
            RepositoryError::DataCorruption(format!("negative price for {}", row.slug))
        })?;

        Ok(Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            price,
            active: row.active,
        })
    }
}

/// `PostgreSQL` catalog storage.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalog {
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, slug, title, price, active
            FROM storefront.product
            WHERE id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn upsert_product(
        &self,
        product: &ProductUpsert,
        now: DateTime<Utc>,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO storefront.product (slug, title, price, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (slug) DO UPDATE SET
                title = EXCLUDED.title,
                price = EXCLUDED.price,
                active = EXCLUDED.active,
                updated_at = EXCLUDED.updated_at
            RETURNING id, slug, title, price, active
            ",
        )
        .bind(&product.slug)
        .bind(&product.title)
        .bind(product.price.amount())
        .bind(product.active)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }
}
