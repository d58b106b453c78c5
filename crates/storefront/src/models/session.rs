//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use boxlane_core::{AccountId, AccountRole, Actor, Email};

use super::account::Account;

/// Session-stored account identity.
///
/// Minimal data stored in the session to identify the logged-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentAccount {
    /// Account's database ID.
    pub id: AccountId,
    /// Account's email address.
    pub email: Email,
    /// Role at login time.
    pub role: AccountRole,
}

impl CurrentAccount {
    /// The actor handed to service calls.
    #[must_use]
    pub const fn actor(&self) -> Actor {
        match self.role {
            AccountRole::Customer => Actor::Customer(self.id),
            AccountRole::Admin => Actor::Admin(self.id),
        }
    }
}

impl From<&Account> for CurrentAccount {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            role: account.role,
        }
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in account.
    pub const CURRENT_ACCOUNT: &str = "current_account";
}
