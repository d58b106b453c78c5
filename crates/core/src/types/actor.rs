//! The authenticated party performing an operation.

use serde::{Deserialize, Serialize};

use super::id::AccountId;

/// Who is asking for a state change.
///
/// Every workflow operation takes an explicit `Actor` rather than reading
/// the current session. The transport layer resolves the session into one
/// of these before calling in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "account_id", rename_all = "snake_case")]
pub enum Actor {
    /// A shopper acting on their own behalf.
    Customer(AccountId),
    /// A back-office administrator.
    Admin(AccountId),
    /// The platform itself (scheduled or automated transitions).
    System,
}

impl Actor {
    /// The account behind this actor, if any.
    #[must_use]
    pub const fn account_id(&self) -> Option<AccountId> {
        match self {
            Self::Customer(id) | Self::Admin(id) => Some(*id),
            Self::System => None,
        }
    }

    /// Whether this actor holds the admin role.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin(_))
    }

    /// Whether this actor is the given account, regardless of role.
    #[must_use]
    pub fn is_account(&self, account_id: AccountId) -> bool {
        self.account_id() == Some(account_id)
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer(id) => write!(f, "customer:{id}"),
            Self::Admin(id) => write!(f, "admin:{id}"),
            Self::System => f.write_str("system"),
        }
    }
}
