//! Database migration command.
//!
//! Applies the migrations embedded from `crates/storefront/migrations/`.
//! The server never migrates on start-up; run this before deploying.
//!
//! # Environment Variables
//!
//! - `BOXLANE_DATABASE_URL` - `PostgreSQL` connection string (or `DATABASE_URL`)

use thiserror::Error;

use super::{CommandError, connect};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run all pending migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let pool = connect().await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
