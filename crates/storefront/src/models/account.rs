//! Account domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use boxlane_core::{AccountId, AccountRole, Actor, Email, VerificationState};

/// A storefront account (domain type).
///
/// The password hash is deliberately not part of this type; it is only read
/// by the login and password-reset paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Unique account ID.
    pub id: AccountId,
    /// Normalized email address.
    pub email: Email,
    /// Customer or admin.
    pub role: AccountRole,
    /// Whether the email address has been confirmed with a code.
    pub verification_state: VerificationState,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verification_state == VerificationState::Verified
    }

    /// The actor this account acts as.
    #[must_use]
    pub const fn actor(&self) -> Actor {
        match self.role {
            AccountRole::Customer => Actor::Customer(self.id),
            AccountRole::Admin => Actor::Admin(self.id),
        }
    }
}
