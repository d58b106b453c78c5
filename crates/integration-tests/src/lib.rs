//! Integration test harness for Boxlane.
//!
//! Wires the real services to a set of repositories (the in-memory store
//! by default) and to in-memory collaborators: an outbox that records
//! every code handed to the notifier, a blob store that counts writes, and
//! a clock the test moves by hand.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p boxlane-integration-tests
//! ```
//!
//! No database or SMTP server is needed, except for the ignored
//! `PostgreSQL` suite:
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p boxlane-integration-tests --test postgres -- --ignored
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use boxlane_core::{
    AccountRole, Actor, BlobRef, BlobStore, BlobStoreError, Clock, CodeDelivery, CodePolicy,
    CodePurpose, Email, ImageType, Notifier, NotifyError, PaymentMethod, Price,
};
use boxlane_storefront::db::{MemoryStore, Repositories, RepositoryError};
use boxlane_storefront::models::{Account, Order, Product, ProductUpsert, ShippingAddress};
use boxlane_storefront::services::{
    CartLine, CheckoutRequest, Collaborators, ServiceSettings, Services,
};

/// Password used for every test account.
pub const PASSWORD: &str = "correct horse battery";

/// Receipt size limit used by the harness.
pub const MAX_RECEIPT_BYTES: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Collaborators
// =============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn advance(&self, seconds: i64) {
        *lock(&self.0) += TimeDelta::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.0)
    }
}

/// Records every code handed to the notifier.
#[derive(Debug, Default)]
pub struct Outbox(Mutex<Vec<CodeDelivery>>);

impl Outbox {
    /// Number of codes delivered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.0).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent code sent to `email` for `purpose`.
    #[must_use]
    pub fn last_code(&self, email: &str, purpose: CodePurpose) -> Option<String> {
        lock(&self.0)
            .iter()
            .rev()
            .find(|d| d.email.as_str() == email && d.purpose == purpose)
            .map(|d| d.code.as_str().to_owned())
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send_code(&self, delivery: &CodeDelivery) -> Result<(), NotifyError> {
        lock(&self.0).push(delivery.clone());
        Ok(())
    }
}

/// Keeps stored receipts in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobs(Mutex<Vec<(BlobRef, ImageType, usize)>>);

impl MemoryBlobs {
    /// Number of `store` calls so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        lock(&self.0).len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn store(&self, bytes: &[u8], image_type: ImageType) -> Result<BlobRef, BlobStoreError> {
        let mut blobs = lock(&self.0);
        let blob_ref = BlobRef::new(format!("mem/{}.{}", blobs.len(), image_type.extension()));
        blobs.push((blob_ref.clone(), image_type, bytes.len()));
        Ok(blob_ref)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A minimal PNG: the signature plus a few bytes.
#[must_use]
pub fn png() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0, 0, 0, 13, b'I', b'H', b'D', b'R']);
    bytes
}

/// A minimal JPEG header.
#[must_use]
pub fn jpeg() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F']
}

#[must_use]
pub fn shipping() -> ShippingAddress {
    ShippingAddress {
        recipient: "Ada Lovelace".to_string(),
        line1: "12 Analytical Row".to_string(),
        line2: None,
        city: "London".to_string(),
        region: None,
        postal_code: "N1 9GU".to_string(),
        country_code: "gb".to_string(),
        phone: None,
    }
}

#[must_use]
pub fn cart(lines: &[(Product, u32)], payment_method: PaymentMethod) -> CheckoutRequest {
    CheckoutRequest {
        items: lines
            .iter()
            .map(|(product, quantity)| CartLine {
                product_id: product.id,
                quantity: *quantity,
            })
            .collect(),
        shipping: shipping(),
        payment_method,
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Services over one set of repositories, plus handles on every collaborator.
#[derive(Clone)]
pub struct Harness {
    pub repos: Repositories,
    pub services: Services,
    pub clock: Arc<ManualClock>,
    pub outbox: Arc<Outbox>,
    pub blobs: Arc<MemoryBlobs>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(CodePolicy::default())
    }
}

impl Harness {
    /// Harness over a fresh in-memory store.
    #[must_use]
    pub fn new(code_policy: CodePolicy) -> Self {
        Self::with_repositories(Repositories::memory(&Arc::new(MemoryStore::new())), code_policy)
    }

    /// Harness over the given repositories.
    #[must_use]
    pub fn with_repositories(repos: Repositories, code_policy: CodePolicy) -> Self {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap_or_default();
        let clock = Arc::new(ManualClock::new(start));
        let outbox = Arc::new(Outbox::default());
        let blobs = Arc::new(MemoryBlobs::default());

        let collaborators = Collaborators {
            notifier: outbox.clone(),
            blobs: blobs.clone(),
            clock: clock.clone(),
        };
        let settings = ServiceSettings {
            code_policy,
            max_receipt_bytes: MAX_RECEIPT_BYTES,
        };
        let services = Services::new(&repos, &collaborators, settings);

        Self {
            repos,
            services,
            clock,
            outbox,
            blobs,
        }
    }

    /// Add an active product priced in cents.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the product.
    pub async fn product(&self, slug: &str, cents: i64) -> Result<Product, RepositoryError> {
        let price = Price::from_cents(cents)
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        self.repos
            .catalog
            .upsert_product(
                &ProductUpsert {
                    slug: slug.to_string(),
                    title: slug.replace('-', " "),
                    price,
                    active: true,
                },
                self.clock.now(),
            )
            .await
    }

    /// Register an account and confirm it with the code from the outbox.
    ///
    /// # Panics
    ///
    /// Panics if any step fails; harness setup errors are test bugs.
    pub async fn verified_customer(&self, email: &str) -> Account {
        let accounts = &self.services.accounts;
        accounts
            .register(email, PASSWORD)
            .await
            .unwrap_or_else(|e| panic!("register {email}: {e}"));
        let code = self
            .outbox
            .last_code(email, CodePurpose::Registration)
            .unwrap_or_else(|| panic!("no code sent to {email}"));
        accounts
            .verify(email, &code)
            .await
            .unwrap_or_else(|e| panic!("verify {email}: {e}"))
    }

    /// A verified account with the admin role.
    ///
    /// # Panics
    ///
    /// Panics if any step fails.
    pub async fn admin(&self, email: &str) -> Actor {
        self.verified_customer(email).await;
        let email = Email::parse(email).unwrap_or_else(|e| panic!("{e}"));
        let admin = self
            .repos
            .accounts
            .set_role(&email, AccountRole::Admin, self.clock.now())
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| panic!("promote {email}"));
        admin.actor()
    }

    /// Place an order without a receipt.
    ///
    /// # Panics
    ///
    /// Panics if checkout fails.
    pub async fn order(&self, customer: &Account, product: &Product, method: PaymentMethod) -> Order {
        self.services
            .checkout
            .checkout(customer.id, cart(&[(product.clone(), 1)], method), None)
            .await
            .unwrap_or_else(|e| panic!("checkout: {e}"))
            .order
    }
}
