//! Account gate error types.

use thiserror::Error;

use boxlane_core::CodeError;

use crate::db::RepositoryError;
use crate::services::verification::VerificationError;

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] boxlane_core::EmailError),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Email already registered.
    #[error("account already exists")]
    AccountAlreadyExists,

    /// Invalid credentials (wrong password or account not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Email address not confirmed yet.
    #[error("email verification required")]
    VerificationRequired,

    /// Account not found.
    #[error("account not found")]
    AccountNotFound,

    /// Verification code rejected.
    #[error(transparent)]
    Code(#[from] CodeError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

impl AccountError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidEmail(_) => "invalid_email",
            Self::WeakPassword(_) => "weak_password",
            Self::AccountAlreadyExists => "account_already_exists",
            Self::InvalidCredentials => "invalid_credentials",
            Self::VerificationRequired => "verification_required",
            Self::AccountNotFound => "account_not_found",
            Self::Code(e) => e.code(),
            Self::Repository(_) | Self::PasswordHash => "internal_error",
        }
    }
}

impl From<VerificationError> for AccountError {
    fn from(e: VerificationError) -> Self {
        match e {
            VerificationError::Code(code) => Self::Code(code),
            VerificationError::Repository(repo) => Self::Repository(repo),
        }
    }
}
