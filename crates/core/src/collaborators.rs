//! Interfaces to the outside world: code delivery, receipt storage, time.
//!
//! The storefront supplies real implementations (SMTP, filesystem, system
//! clock); tests supply in-memory ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::otp::OneTimeCode;
use crate::types::{AccountId, CodePurpose, Email};
use crate::upload::ImageType;

/// A freshly issued code on its way to the account holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDelivery {
    pub account_id: AccountId,
    pub email: Email,
    pub purpose: CodePurpose,
    pub code: OneTimeCode,
    pub expires_at: DateTime<Utc>,
}

/// Failure to hand a code to the delivery channel.
#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers verification codes (email, SMS, ...).
///
/// Called exactly once per successful issuance. Delivery is
/// fire-and-forget: an error is logged by the caller and never undoes the
/// issuance.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hand `delivery` to the channel.
    async fn send_code(&self, delivery: &CodeDelivery) -> Result<(), NotifyError>;
}

/// Opaque, immutable reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    /// Wrap a reference produced by a [`BlobStore`].
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure to persist a blob.
#[derive(Debug, thiserror::Error)]
#[error("blob storage failed: {0}")]
pub struct BlobStoreError(pub String);

/// Stores uploaded receipt images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` and return a reference to them.
    async fn store(&self, bytes: &[u8], image_type: ImageType) -> Result<BlobRef, BlobStoreError>;
}

/// Source of the current time.
///
/// TTL and cooldown checks read the clock once per operation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
