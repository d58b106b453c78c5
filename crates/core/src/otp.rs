//! One-time verification code rules.
//!
//! This module decides what an issuance or a validation attempt *should* do
//! given the stored code record and the current time. It performs no I/O;
//! the storefront's verification service persists the outcome with a
//! compare-and-set write.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AccountId, CodePurpose};

/// Number of digits in a verification code.
pub const CODE_LENGTH: usize = 6;

/// Errors surfaced by issuance and validation.
///
/// These are reported verbatim to the client so it can prompt for a resend
/// or a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    /// The submitted value does not match the live code, or there is none.
    #[error("verification code is invalid")]
    InvalidCode,
    /// The live code's TTL has passed.
    #[error("verification code has expired")]
    Expired,
    /// Too many wrong attempts; a new code must be requested.
    #[error("too many attempts, request a new code")]
    AttemptsExceeded,
    /// A code for this purpose was issued too recently.
    #[error("a code was sent recently, retry in {retry_after_seconds}s")]
    Cooldown {
        /// Seconds until a new code may be issued.
        retry_after_seconds: i64,
    },
}

impl CodeError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCode => "invalid_code",
            Self::Expired => "code_expired",
            Self::AttemptsExceeded => "attempts_exceeded",
            Self::Cooldown { .. } => "cooldown",
        }
    }
}

/// Timing and attempt limits for verification codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePolicy {
    /// How long a code stays valid after issuance.
    pub ttl: TimeDelta,
    /// Minimum gap between two issuances for the same account and purpose.
    pub cooldown: TimeDelta,
    /// Wrong submissions allowed before the code is locked.
    pub max_attempts: u32,
}

impl CodePolicy {
    /// Build a policy from whole seconds.
    #[must_use]
    pub fn from_seconds(ttl_seconds: i64, cooldown_seconds: i64, max_attempts: u32) -> Self {
        Self {
            ttl: TimeDelta::seconds(ttl_seconds),
            cooldown: TimeDelta::seconds(cooldown_seconds),
            max_attempts,
        }
    }

    /// Check whether a new code may be issued, given when the previous one was.
    ///
    /// # Errors
    ///
    /// Returns [`CodeError::Cooldown`] with the remaining wait (rounded up to
    /// whole seconds) while inside the cooldown window.
    pub fn check_cooldown(
        &self,
        previous_issued_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), CodeError> {
        let Some(issued_at) = previous_issued_at else {
            return Ok(());
        };

        let allowed_at = issued_at + self.cooldown;
        if now >= allowed_at {
            return Ok(());
        }

        let remaining = allowed_at - now;
        let mut retry_after_seconds = remaining.num_seconds();
        if remaining.subsec_nanos() > 0 {
            retry_after_seconds += 1;
        }
        Err(CodeError::Cooldown {
            retry_after_seconds: retry_after_seconds.max(1),
        })
    }
}

impl Default for CodePolicy {
    fn default() -> Self {
        Self::from_seconds(600, 60, 3)
    }
}

/// A six-digit numeric code.
///
/// `Debug` is redacted so codes never end up in logs by accident.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OneTimeCode(String);

impl OneTimeCode {
    /// Generate a uniformly random code, `000000` to `999999`.
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let value: u32 = rand::rng().random_range(0..1_000_000);
        Self(format!("{value:06}"))
    }

    /// Parse a submitted code. Returns `None` unless it is exactly six ASCII digits.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        (trimmed.len() == CODE_LENGTH && trimmed.bytes().all(|b| b.is_ascii_digit()))
            .then(|| Self(trimmed.to_owned()))
    }

    /// The digits as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against another code.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }

        let mut result: u8 = 0;
        for (x, y) in self.0.bytes().zip(other.0.bytes()) {
            result |= x ^ y;
        }

        result == 0
    }
}

impl std::fmt::Debug for OneTimeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OneTimeCode([REDACTED])")
    }
}

/// A stored verification code for one (account, purpose) pair.
///
/// `id` changes on every issuance and acts as the version token for
/// compare-and-set writes: a write keyed on a stale `id` matches no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRecord {
    pub id: Uuid,
    pub account_id: AccountId,
    pub purpose: CodePurpose,
    pub code: OneTimeCode,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// What a validation attempt resolves to before it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    /// The code matches; mark the record consumed.
    Accept,
    /// Wrong value; bump `attempt_count` and report [`CodeError::InvalidCode`].
    CountFailure,
    /// Reject without touching the record.
    Reject(CodeError),
}

impl CodeRecord {
    /// A freshly issued record with a new random code.
    #[must_use]
    pub fn issue(
        account_id: AccountId,
        purpose: CodePurpose,
        policy: &CodePolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            purpose,
            code: OneTimeCode::generate(),
            issued_at: now,
            expires_at: now + policy.ttl,
            attempt_count: 0,
            max_attempts: policy.max_attempts,
            consumed_at: None,
        }
    }

    /// Evaluate a submitted value against this record.
    ///
    /// Checks run in a fixed order: consumed, exhausted, expired, value.
    /// Only a well-formed-but-wrong or malformed submission against a live
    /// code consumes an attempt.
    #[must_use]
    pub fn check(&self, submitted: &str, now: DateTime<Utc>) -> CodeCheck {
        if self.consumed_at.is_some() {
            return CodeCheck::Reject(CodeError::InvalidCode);
        }
        if self.attempt_count >= self.max_attempts {
            return CodeCheck::Reject(CodeError::AttemptsExceeded);
        }
        if now >= self.expires_at {
            return CodeCheck::Reject(CodeError::Expired);
        }

        match OneTimeCode::parse(submitted) {
            Some(candidate) if self.code.matches(&candidate) => CodeCheck::Accept,
            _ => CodeCheck::CountFailure,
        }
    }
}
