//! Account gate.
//!
//! Password registration and login, gated on email verification. Codes
//! come from the [`VerificationService`]; credential failures are reported
//! as one generic error so callers cannot tell which emails exist.

mod error;

pub use error::AccountError;

use std::sync::{Arc, LazyLock};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::{info, instrument};

use boxlane_core::{AccountId, Clock, CodeError, CodePurpose, Email};

use super::verification::{VerificationError, VerificationService};
use crate::db::{AccountRepository, RepositoryError};
use crate::models::Account;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash checked when no account matches, so unknown emails cost the same.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("boxlane-unknown-account").ok());

/// Registration, login, verification, and password reset.
#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
    verification: VerificationService,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        verification: VerificationService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            verification,
            clock,
        }
    }

    /// Register a new account and send its registration code.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::InvalidEmail` if the email format is invalid.
    /// Returns `AccountError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AccountError::AccountAlreadyExists` if the email is already registered.
    #[instrument(skip(self, email, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<Account, AccountError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let account = self
            .accounts
            .create_account(&email, &password_hash, self.clock.now())
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AccountError::AccountAlreadyExists,
                other => AccountError::Repository(other),
            })?;

        info!(account_id = %account.id, email = %email.redacted(), "Account registered");

        self.verification
            .issue(account.id, &account.email, CodePurpose::Registration)
            .await?;

        Ok(account)
    }

    /// Login with email and password.
    ///
    /// An unverified account gets a fresh registration code (cooldown
    /// permitting) and is turned away.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::InvalidCredentials` if the email/password is wrong.
    /// Returns `AccountError::VerificationRequired` if the email is not confirmed.
    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Account, AccountError> {
        let Ok(email) = Email::parse(email) else {
            return Err(reject_unknown_account(password));
        };

        let Some((account, password_hash)) = self.accounts.account_with_password(&email).await?
        else {
            return Err(reject_unknown_account(password));
        };

        verify_password(password, &password_hash)?;

        if !account.is_verified() {
            match self
                .verification
                .issue(account.id, &account.email, CodePurpose::Registration)
                .await
            {
                Ok(_) => {}
                Err(VerificationError::Code(CodeError::Cooldown {
                    retry_after_seconds,
                })) => {
                    info!(
                        account_id = %account.id,
                        retry_after_seconds,
                        "Login by unverified account inside resend cooldown"
                    );
                }
                Err(e) => return Err(e.into()),
            }
            return Err(AccountError::VerificationRequired);
        }

        info!(account_id = %account.id, "Login succeeded");
        Ok(account)
    }

    /// Confirm an email address with its registration code.
    ///
    /// Idempotent for accounts that are already verified.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::Code` if the code is rejected. Unknown emails
    /// are reported as `CodeError::InvalidCode`.
    #[instrument(skip(self, email, code))]
    pub async fn verify(&self, email: &str, code: &str) -> Result<Account, AccountError> {
        let account = self.find_for_code(email).await?;
        if account.is_verified() {
            return Ok(account);
        }

        self.verification
            .validate(account.id, CodePurpose::Registration, code)
            .await?;

        if self
            .accounts
            .mark_verified(account.id, self.clock.now())
            .await?
        {
            info!(account_id = %account.id, "Email verified");
        }

        self.accounts
            .account_by_id(account.id)
            .await?
            .ok_or(AccountError::AccountNotFound)
    }

    /// Send another registration code.
    ///
    /// Unknown and already-verified emails succeed silently.
    ///
    /// # Errors
    ///
    /// Returns `CodeError::Cooldown` if the last code is too recent.
    #[instrument(skip(self, email))]
    pub async fn resend_verification(&self, email: &str) -> Result<(), AccountError> {
        let email = Email::parse(email)?;
        let Some(account) = self.accounts.account_by_email(&email).await? else {
            return Ok(());
        };
        if account.is_verified() {
            return Ok(());
        }

        self.verification
            .issue(account.id, &account.email, CodePurpose::Registration)
            .await?;
        Ok(())
    }

    /// Send a password reset code.
    ///
    /// Unknown emails succeed silently.
    ///
    /// # Errors
    ///
    /// Returns `CodeError::Cooldown` if the last code is too recent.
    #[instrument(skip(self, email))]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AccountError> {
        let email = Email::parse(email)?;
        let Some(account) = self.accounts.account_by_email(&email).await? else {
            return Ok(());
        };

        self.verification
            .issue(account.id, &account.email, CodePurpose::PasswordReset)
            .await?;
        Ok(())
    }

    /// Set a new password using a password reset code.
    ///
    /// Leaves the verification state untouched.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::WeakPassword` before looking at the code.
    /// Returns `AccountError::Code` if the code is rejected.
    #[instrument(skip(self, email, code, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AccountError> {
        validate_password(new_password)?;
        let account = self.find_for_code(email).await?;

        self.verification
            .validate(account.id, CodePurpose::PasswordReset, code)
            .await?;

        let password_hash = hash_password(new_password)?;
        self.accounts
            .set_password_hash(account.id, &password_hash, self.clock.now())
            .await?;

        info!(account_id = %account.id, "Password reset");
        Ok(())
    }

    /// Load an account that must have a confirmed email.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::AccountNotFound` or `AccountError::VerificationRequired`.
    pub async fn require_verified(&self, account_id: AccountId) -> Result<Account, AccountError> {
        let account = self
            .accounts
            .account_by_id(account_id)
            .await?
            .ok_or(AccountError::AccountNotFound)?;

        if !account.is_verified() {
            return Err(AccountError::VerificationRequired);
        }
        Ok(account)
    }

    /// Resolve the account a code was sent to, without revealing whether it exists.
    async fn find_for_code(&self, email: &str) -> Result<Account, AccountError> {
        let Ok(email) = Email::parse(email) else {
            return Err(CodeError::InvalidCode.into());
        };
        self.accounts
            .account_by_email(&email)
            .await?
            .ok_or(AccountError::Code(CodeError::InvalidCode))
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AccountError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AccountError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AccountError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AccountError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AccountError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AccountError::InvalidCredentials)
}

/// Spend one Argon2 verification, then fail with the generic error.
fn reject_unknown_account(password: &str) -> AccountError {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    AccountError::InvalidCredentials
}
