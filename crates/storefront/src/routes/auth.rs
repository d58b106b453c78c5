//! Authentication route handlers.
//!
//! Registration, email verification, login, and password reset. Every
//! endpoint takes and returns JSON.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_account, set_current_account};
use crate::models::{Account, CurrentAccount};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Email and password, for registration and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Email plus the code that was sent to it.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

/// Email only, for resend and reset requests.
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// Password reset confirmation.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// Account as returned to its owner.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account: Account,
}

/// Acknowledgement for requests that reveal nothing about the account.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
}

const ACCEPTED: AcceptedResponse = AcceptedResponse { status: "accepted" };

// =============================================================================
// Handlers
// =============================================================================

/// Register a new account and send its verification code.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .services()
        .accounts
        .register(&body.email, &body.password)
        .await?;

    Ok((StatusCode::CREATED, Json(AccountResponse { account })))
}

/// Confirm an email address with its registration code.
pub async fn verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = state
        .services()
        .accounts
        .verify(&body.email, &body.code)
        .await?;

    Ok(Json(AccountResponse { account }))
}

/// Send a fresh registration code.
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    state
        .services()
        .accounts
        .resend_verification(&body.email)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(ACCEPTED)))
}

/// Log in with email and password.
///
/// Unverified accounts get a fresh code and a `verification_required` error.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = state
        .services()
        .accounts
        .login(&body.email, &body.password)
        .await?;

    set_current_account(&session, &CurrentAccount::from(&account)).await?;
    set_sentry_user(&account.id);

    Ok(Json(AccountResponse { account }))
}

/// End the session.
pub async fn logout(session: Session) -> Result<StatusCode, AppError> {
    clear_current_account(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// Send a password reset code.
///
/// Answers the same way whether or not the email is registered.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    state
        .services()
        .accounts
        .request_password_reset(&body.email)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(ACCEPTED)))
}

/// Set a new password with a reset code.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<StatusCode, AppError> {
    state
        .services()
        .accounts
        .reset_password(&body.email, &body.code, &body.new_password)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
