//! Authentication extractors.
//!
//! Resolve the session into the account making the request. Handlers turn
//! it into an explicit [`boxlane_core::Actor`] for service calls.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use boxlane_core::AccountRole;

use crate::error::AppError;
use crate::models::{CurrentAccount, session_keys};

/// Extractor that requires a logged-in account.
///
/// # Example
///
/// ```rust,ignore
/// async fn my_orders(RequireAccount(account): RequireAccount) -> impl IntoResponse {
///     format!("Hello, {}!", account.email)
/// }
/// ```
pub struct RequireAccount(pub CurrentAccount);

impl<S> FromRequestParts<S> for RequireAccount
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let account: CurrentAccount = session
            .get(session_keys::CURRENT_ACCOUNT)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Login required".to_string()))?;

        Ok(Self(account))
    }
}

/// Extractor that requires a logged-in admin.
pub struct RequireAdmin(pub CurrentAccount);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAccount(account) = RequireAccount::from_request_parts(parts, state).await?;

        if account.role != AccountRole::Admin {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }

        Ok(Self(account))
    }
}

/// Store the logged-in account in the session.
///
/// Cycles the session ID first so a pre-login session ID cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_account(
    session: &Session,
    account: &CurrentAccount,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_ACCOUNT, account).await
}

/// End the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_account(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
