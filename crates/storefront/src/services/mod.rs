//! Business logic services for storefront.
//!
//! # Services
//!
//! - `verification` - One-time codes per (account, purpose)
//! - `accounts` - Registration, login, and password reset gated on verification
//! - `orders` - Order reads and status transitions
//! - `payments` - Receipt uploads and admin review
//! - `checkout` - Cart to order, with an optional receipt
//!
//! Collaborator implementations live in `notifier` and `blob_store`.
//!
//! Every state change is a compare-and-set keyed on the state it was
//! planned from. A write that loses a race is re-planned against fresh
//! state, up to [`MAX_CAS_RETRIES`] times.

pub mod accounts;
pub mod blob_store;
pub mod checkout;
pub mod notifier;
pub mod orders;
pub mod payments;
pub mod verification;

use std::sync::Arc;

use boxlane_core::{BlobStore, Clock, CodePolicy, Notifier};

use crate::db::Repositories;

pub use accounts::{AccountError, AccountService};
pub use blob_store::FsBlobStore;
pub use checkout::{
    CartLine, CheckoutError, CheckoutOutcome, CheckoutRequest, CheckoutService, ReceiptFile,
};
pub use notifier::{EmailNotifier, LogNotifier};
pub use orders::{OrderError, OrderService};
pub use payments::{PaymentError, PaymentService};
pub use verification::{VerificationError, VerificationService};

/// Attempts at a compare-and-set write before giving up with a conflict.
pub const MAX_CAS_RETRIES: usize = 3;

/// External collaborators the services call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub blobs: Arc<dyn BlobStore>,
    pub clock: Arc<dyn Clock>,
}

/// Service settings taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub code_policy: CodePolicy,
    pub max_receipt_bytes: usize,
}

/// All services, wired to one set of repositories.
#[derive(Clone)]
pub struct Services {
    pub verification: VerificationService,
    pub accounts: AccountService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub checkout: CheckoutService,
}

impl Services {
    #[must_use]
    pub fn new(
        repos: &Repositories,
        collaborators: &Collaborators,
        settings: ServiceSettings,
    ) -> Self {
        let clock = collaborators.clock.clone();

        let verification = VerificationService::new(
            repos.codes.clone(),
            collaborators.notifier.clone(),
            clock.clone(),
            settings.code_policy,
        );
        let accounts =
            AccountService::new(repos.accounts.clone(), verification.clone(), clock.clone());
        let orders = OrderService::new(repos.orders.clone(), clock.clone());
        let payments = PaymentService::new(
            repos.orders.clone(),
            collaborators.blobs.clone(),
            clock.clone(),
            settings.max_receipt_bytes,
        );
        let checkout = CheckoutService::new(
            accounts.clone(),
            payments.clone(),
            repos.catalog.clone(),
            repos.orders.clone(),
            clock,
        );

        Self {
            verification,
            accounts,
            orders,
            payments,
            checkout,
        }
    }
}
