//! Catalog seeding.
//!
//! Reads a YAML list of products and upserts each one by slug:
//!
//! ```yaml
//! - slug: coffee-monthly
//!   title: Monthly Coffee Box
//!   price: "24.00"
//! - slug: tea-sampler
//!   title: Tea Sampler
//!   price: "18.50"
//!   active: false
//! ```

use std::collections::HashSet;
use std::path::Path;

use boxlane_storefront::db::{CatalogRepository, PgCatalog, RepositoryError};
use boxlane_storefront::models::ProductUpsert;
use thiserror::Error;

use super::{CommandError, connect};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid catalog file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid catalog entry: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Parse and sanity-check a catalog file.
fn parse_catalog(yaml: &str) -> Result<Vec<ProductUpsert>, CatalogError> {
    let products: Vec<ProductUpsert> = serde_yaml::from_str(yaml)?;

    let mut seen = HashSet::new();
    for product in &products {
        if product.slug.trim().is_empty() || product.title.trim().is_empty() {
            return Err(CatalogError::Invalid(
                "slug and title must not be empty".to_string(),
            ));
        }
        if !seen.insert(product.slug.as_str()) {
            return Err(CatalogError::Invalid(format!(
                "duplicate slug '{}'",
                product.slug
            )));
        }
    }

    Ok(products)
}

/// Upsert every product in `file`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, or a write fails.
/// Products written before the failure stay written.
pub async fn seed(file: &Path) -> Result<(), CatalogError> {
    let yaml = std::fs::read_to_string(file).map_err(|source| CatalogError::Read {
        path: file.display().to_string(),
        source,
    })?;
    let products = parse_catalog(&yaml)?;

    let pool = connect().await?;
    let catalog = PgCatalog::new(pool);
    let now = chrono::Utc::now();

    for product in &products {
        let saved = catalog.upsert_product(product, now).await?;
        tracing::info!(
            product_id = %saved.id,
            slug = %saved.slug,
            price = %saved.price,
            active = saved.active,
            "Product saved"
        );
    }

    tracing::info!(count = products.len(), "Catalog seeded");
    Ok(())
}
