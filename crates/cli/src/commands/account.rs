//! Account management commands.
//!
//! Admins are ordinary accounts with the admin role. Register through the
//! API first, then promote:
//!
//! ```bash
//! boxlane-cli account promote -e admin@example.com
//! ```

use boxlane_core::{AccountRole, Email, EmailError};
use boxlane_storefront::db::{AccountRepository, PgAccounts, RepositoryError};
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountCommandError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("No account with email: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Give the account registered under `email` the admin role.
///
/// # Errors
///
/// Returns an error if the email is malformed, no such account exists, or
/// the database is unreachable.
pub async fn promote(email: &str) -> Result<(), AccountCommandError> {
    let email = Email::parse(email)?;
    let pool = connect().await?;
    let accounts = PgAccounts::new(pool);

    let account = accounts
        .set_role(&email, AccountRole::Admin, chrono::Utc::now())
        .await?
        .ok_or_else(|| AccountCommandError::NotFound(email.to_string()))?;

    tracing::info!(
        account_id = %account.id,
        verified = account.is_verified(),
        "Account promoted to admin"
    );
    if !account.is_verified() {
        tracing::warn!("Account email is not verified yet; login stays blocked until it is");
    }

    Ok(())
}
