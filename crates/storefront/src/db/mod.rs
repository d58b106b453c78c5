//! Database operations for storefront `PostgreSQL`.
//!
//! # Database: `boxlane`
//!
//! ## Tables (schema `storefront`)
//!
//! - `account` - Login identity, role, and verification state
//! - `verification_code` - One row per (account, purpose); overwritten on reissue
//! - `product` - Catalog prices read at checkout
//! - `customer_order` / `order_item` - Orders with frozen line items
//! - `receipt` - Proof-of-payment uploads and their review
//!
//! Sessions live in `tower_sessions.session`.
//!
//! # Compare-and-set
//!
//! Every state-changing write is keyed on the state the caller observed
//! (`WHERE status = $n`, `WHERE attempt_count = $n`, ...). A write that
//! matches no row reports `false`/`None`; the service re-reads and
//! re-evaluates instead of overwriting.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p boxlane-cli -- migrate
//! ```

pub mod accounts;
pub mod catalog;
pub mod memory;
pub mod orders;
pub mod verification_codes;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use boxlane_core::{
    AccountId, AccountRole, CodePurpose, CodeRecord, Email, OrderId, OrderStatus, PaymentStatus,
    ProductId, Transition,
};

use crate::models::{
    Account, NewOrder, NewReceipt, Order, Product, ProductUpsert, Receipt, ReceiptReview,
};

pub use accounts::PgAccounts;
pub use catalog::PgCatalog;
pub use memory::MemoryStore;
pub use orders::PgOrders;
pub use verification_codes::PgVerificationCodes;

/// Errors that can occur during repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email) or a write that kept losing races.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique violation to [`RepositoryError::Conflict`].
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(what.to_owned());
    }
    RepositoryError::Database(e)
}

/// Accounts and their credentials.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new unverified customer.
    ///
    /// Returns `Conflict` if the email is taken.
    async fn create_account(
        &self,
        email: &Email,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError>;

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, RepositoryError>;

    async fn account_by_email(&self, email: &Email) -> Result<Option<Account>, RepositoryError>;

    /// Account plus stored password hash, for login.
    async fn account_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(Account, String)>, RepositoryError>;

    /// Flip `Unverified → Verified`. Returns `false` if the account was not unverified.
    async fn mark_verified(&self, id: AccountId, now: DateTime<Utc>)
    -> Result<bool, RepositoryError>;

    async fn set_password_hash(
        &self,
        id: AccountId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Change an account's role. Returns `None` if no account has this email.
    async fn set_role(
        &self,
        email: &Email,
        role: AccountRole,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, RepositoryError>;
}

/// Verification codes, one row per (account, purpose).
#[async_trait]
pub trait VerificationCodeRepository: Send + Sync {
    async fn find_code(
        &self,
        account_id: AccountId,
        purpose: CodePurpose,
    ) -> Result<Option<CodeRecord>, RepositoryError>;

    /// Insert `record`, or overwrite the existing row for its pair if that
    /// row was issued at or before `issued_before`.
    ///
    /// Returns `false` when a more recent issuance blocked the write.
    async fn replace_code(
        &self,
        record: &CodeRecord,
        issued_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Increment the attempt counter if the row still has `id` and `expected_attempts`.
    async fn record_failed_attempt(
        &self,
        id: Uuid,
        expected_attempts: u32,
    ) -> Result<bool, RepositoryError>;

    /// Mark the code consumed if the row still has `id` and `expected_attempts`
    /// and has not been consumed.
    async fn consume_code(
        &self,
        id: Uuid,
        expected_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

/// Orders and receipts.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert an order in `Placed` / `Pending` with its line items.
    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Orders owned by an account, newest first.
    async fn orders_for_account(&self, account_id: AccountId)
    -> Result<Vec<Order>, RepositoryError>;

    /// Bank-transfer orders with a receipt awaiting review, oldest first.
    async fn orders_awaiting_verification(&self) -> Result<Vec<Order>, RepositoryError>;

    /// Apply a planned transition if the order still has `transition.from`
    /// and `transition.expected_payment_status`.
    async fn apply_transition(
        &self,
        id: OrderId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Insert a receipt and set the order to `AwaitingVerification`, in one
    /// transaction, if the order still has the observed statuses.
    ///
    /// Returns `None` when the order moved on.
    async fn attach_receipt(
        &self,
        receipt: &NewReceipt,
        expected_status: OrderStatus,
        expected_payment_status: PaymentStatus,
    ) -> Result<Option<Receipt>, RepositoryError>;

    /// Record a decision on the active receipt and update the order, in one
    /// transaction, if payment is still `AwaitingVerification`.
    ///
    /// Returns `None` when another review got there first.
    async fn record_review(&self, review: &ReceiptReview)
    -> Result<Option<Receipt>, RepositoryError>;

    /// All receipts for an order, oldest first.
    async fn receipts_for_order(&self, order_id: OrderId) -> Result<Vec<Receipt>, RepositoryError>;
}

/// Catalog prices.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Products with the given IDs; missing IDs are simply absent.
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Insert or update a product by slug.
    async fn upsert_product(
        &self,
        product: &ProductUpsert,
        now: DateTime<Utc>,
    ) -> Result<Product, RepositoryError>;
}

/// The full set of repositories the services run on.
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub codes: Arc<dyn VerificationCodeRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
}

impl Repositories {
    /// `PostgreSQL`-backed repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            accounts: Arc::new(PgAccounts::new(pool.clone())),
            codes: Arc::new(PgVerificationCodes::new(pool.clone())),
            orders: Arc::new(PgOrders::new(pool.clone())),
            catalog: Arc::new(PgCatalog::new(pool.clone())),
        }
    }

    /// All repositories backed by one in-memory store.
    #[must_use]
    pub fn memory(store: &Arc<MemoryStore>) -> Self {
        Self {
            accounts: store.clone(),
            codes: store.clone(),
            orders: store.clone(),
            catalog: store.clone(),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Convert a stored non-negative integer column.
pub(crate) fn to_u32(value: i32, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {value}")))
}

/// Convert a count for binding to an `INT4` column.
pub(crate) fn to_i32(value: u32, column: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("{column} out of range: {value}")))
}
