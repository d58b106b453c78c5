//! Verification code engine.
//!
//! Issues and redeems six-digit codes per (account, purpose). The rules
//! live in [`boxlane_core::CodeRecord`]; this service reads the current
//! row, applies the rules, and writes back with compare-and-set. A lost
//! race re-reads and re-evaluates against whatever is now stored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use boxlane_core::{
    AccountId, Clock, CodeCheck, CodeDelivery, CodeError, CodePolicy, CodePurpose, CodeRecord,
    Email, Notifier,
};

use super::MAX_CAS_RETRIES;
use crate::db::{RepositoryError, VerificationCodeRepository};

/// Errors from issuing or redeeming a code.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error(transparent)]
    Code(#[from] CodeError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl VerificationError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Code(e) => e.code(),
            Self::Repository(_) => "internal_error",
        }
    }
}

/// Issues and validates one-time codes.
#[derive(Clone)]
pub struct VerificationService {
    codes: Arc<dyn VerificationCodeRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: CodePolicy,
}

impl VerificationService {
    #[must_use]
    pub fn new(
        codes: Arc<dyn VerificationCodeRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        policy: CodePolicy,
    ) -> Self {
        Self {
            codes,
            notifier,
            clock,
            policy,
        }
    }

    /// Issue a fresh code and hand it to the notifier.
    ///
    /// Replaces any earlier code for the pair. Returns the new expiry.
    ///
    /// # Errors
    ///
    /// Returns `CodeError::Cooldown` if the previous code for the pair was
    /// issued less than the cooldown ago.
    #[instrument(skip(self, email), fields(account_id = %account_id, purpose = %purpose))]
    pub async fn issue(
        &self,
        account_id: AccountId,
        email: &Email,
        purpose: CodePurpose,
    ) -> Result<DateTime<Utc>, VerificationError> {
        let now = self.clock.now();

        for _ in 0..MAX_CAS_RETRIES {
            let previous = self.codes.find_code(account_id, purpose).await?;
            self.policy
                .check_cooldown(previous.as_ref().map(|r| r.issued_at), now)?;

            let record = CodeRecord::issue(account_id, purpose, &self.policy, now);
            if !self
                .codes
                .replace_code(&record, now - self.policy.cooldown)
                .await?
            {
                continue;
            }

            info!(expires_at = %record.expires_at, "Verification code issued");

            let delivery = CodeDelivery {
                account_id,
                email: email.clone(),
                purpose,
                code: record.code,
                expires_at: record.expires_at,
            };
            if let Err(e) = self.notifier.send_code(&delivery).await {
                warn!(error = %e, "Verification code delivery failed");
            }

            return Ok(delivery.expires_at);
        }

        Err(RepositoryError::Conflict("verification code kept changing".to_owned()).into())
    }

    /// Redeem a submitted code.
    ///
    /// # Errors
    ///
    /// Returns `CodeError::InvalidCode` for a wrong, malformed, consumed, or
    /// missing code, `CodeError::Expired` past the TTL, and
    /// `CodeError::AttemptsExceeded` once the attempt budget is spent.
    #[instrument(skip(self, submitted), fields(account_id = %account_id, purpose = %purpose))]
    pub async fn validate(
        &self,
        account_id: AccountId,
        purpose: CodePurpose,
        submitted: &str,
    ) -> Result<(), VerificationError> {
        let now = self.clock.now();

        for _ in 0..MAX_CAS_RETRIES {
            let Some(record) = self.codes.find_code(account_id, purpose).await? else {
                return Err(CodeError::InvalidCode.into());
            };

            match record.check(submitted, now) {
                CodeCheck::Reject(e) => {
                    info!(reason = e.code(), "Verification code rejected");
                    return Err(e.into());
                }
                CodeCheck::Accept => {
                    if self
                        .codes
                        .consume_code(record.id, record.attempt_count, now)
                        .await?
                    {
                        info!("Verification code accepted");
                        return Ok(());
                    }
                }
                CodeCheck::CountFailure => {
                    if self
                        .codes
                        .record_failed_attempt(record.id, record.attempt_count)
                        .await?
                    {
                        info!(
                            attempts = record.attempt_count + 1,
                            max_attempts = record.max_attempts,
                            "Wrong verification code"
                        );
                        return Err(CodeError::InvalidCode.into());
                    }
                }
            }
        }

        Err(RepositoryError::Conflict("verification code kept changing".to_owned()).into())
    }
}
