//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Responses are JSON: `{"error": "<code>", "message": "<text>"}`, where
//! `code` is the stable machine-readable code of the underlying error.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use boxlane_core::{CodeError, LifecycleError, PaymentRuleError, UploadError};

use crate::db::RepositoryError;
use crate::services::{AccountError, CheckoutError, OrderError, PaymentError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Account operation failed.
    #[error(transparent)]
    Account(#[from] AccountError),

    /// Order read or transition failed.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Receipt upload or review failed.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Checkout failed before the order was created.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but the role may not do this.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl AppError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Account(e) => e.code(),
            Self::Order(e) => e.code(),
            Self::Payment(e) => e.code(),
            Self::Checkout(e) => e.code(),
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Account(e) => account_status(e),
            Self::Order(e) => order_status(e),
            Self::Payment(e) => payment_status(e),
            Self::Checkout(e) => checkout_status(e),
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Seconds a client should wait before retrying, for cooldowns.
    #[must_use]
    pub const fn retry_after(&self) -> Option<i64> {
        match self {
            Self::Account(AccountError::Code(CodeError::Cooldown {
                retry_after_seconds,
            })) => Some(*retry_after_seconds),
            _ => None,
        }
    }

    /// Client-facing body; server-side details are not exposed.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let status = self.status();
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            // Not-owner and not-found read the same.
            StatusCode::NOT_FOUND => "Not found".to_string(),
            StatusCode::UNAUTHORIZED => match self {
                Self::Unauthorized(msg) => msg.clone(),
                _ => "Invalid credentials".to_string(),
            },
            _ => self.to_string(),
        };

        let error = match status {
            StatusCode::NOT_FOUND => "not_found",
            _ => self.code(),
        };

        ErrorBody { error, message }
    }
}

const fn code_status(e: &CodeError) -> StatusCode {
    match e {
        CodeError::InvalidCode | CodeError::Expired | CodeError::AttemptsExceeded => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CodeError::Cooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
    }
}

const fn lifecycle_status(e: &LifecycleError) -> StatusCode {
    match e {
        LifecycleError::IllegalTransition { .. }
        | LifecycleError::PaymentNotVerified
        | LifecycleError::TrackingReferenceRequired => StatusCode::CONFLICT,
        LifecycleError::NotOwner => StatusCode::NOT_FOUND,
        LifecycleError::Forbidden => StatusCode::FORBIDDEN,
    }
}

const fn payment_rule_status(e: &PaymentRuleError) -> StatusCode {
    match e {
        PaymentRuleError::WrongPaymentMethod
        | PaymentRuleError::UploadInProgress
        | PaymentRuleError::AlreadyVerified
        | PaymentRuleError::NoPendingReceipt
        | PaymentRuleError::OrderCancelled => StatusCode::CONFLICT,
        PaymentRuleError::ReasonRequired => StatusCode::BAD_REQUEST,
        PaymentRuleError::Forbidden => StatusCode::FORBIDDEN,
    }
}

const fn upload_status(e: &UploadError) -> StatusCode {
    match e {
        UploadError::InvalidFileType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        UploadError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
    }
}

const fn account_status(e: &AccountError) -> StatusCode {
    match e {
        AccountError::InvalidEmail(_) | AccountError::WeakPassword(_) => StatusCode::BAD_REQUEST,
        AccountError::AccountAlreadyExists => StatusCode::CONFLICT,
        AccountError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AccountError::VerificationRequired => StatusCode::FORBIDDEN,
        AccountError::AccountNotFound => StatusCode::NOT_FOUND,
        AccountError::Code(e) => code_status(e),
        AccountError::Repository(_) | AccountError::PasswordHash => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

const fn order_status(e: &OrderError) -> StatusCode {
    match e {
        OrderError::OrderNotFound => StatusCode::NOT_FOUND,
        OrderError::Lifecycle(e) => lifecycle_status(e),
        OrderError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

const fn payment_status(e: &PaymentError) -> StatusCode {
    match e {
        PaymentError::Upload(e) => upload_status(e),
        PaymentError::Rule(e) => payment_rule_status(e),
        PaymentError::OrderNotFound | PaymentError::NotOwner => StatusCode::NOT_FOUND,
        PaymentError::Storage(_) | PaymentError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

const fn checkout_status(e: &CheckoutError) -> StatusCode {
    match e {
        CheckoutError::EmptyCart
        | CheckoutError::InvalidQuantity { .. }
        | CheckoutError::UnknownProduct { .. }
        | CheckoutError::InvalidShipping { .. } => StatusCode::BAD_REQUEST,
        CheckoutError::Account(e) => account_status(e),
        CheckoutError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let mut response = (status, Json(self.body())).into_response();
        if let Some(seconds) = self.retry_after()
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from an account ID.
///
/// Call this after successful authentication to associate errors with accounts.
pub fn set_sentry_user(account_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(account_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the account.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
