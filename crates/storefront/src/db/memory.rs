//! In-memory repository implementation.
//!
//! Backs every repository trait with one mutex-guarded store. Each trait
//! method holds the lock for its whole body, so the compare-and-set rules
//! hold exactly as they do against `PostgreSQL`. Used by tests and by
//! local runs without a database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use boxlane_core::{
    AccountId, AccountRole, CodePurpose, CodeRecord, Email, OrderId, OrderStatus, PaymentStatus,
    ProductId, ReceiptId, Transition, VerificationState,
};

use super::{
    AccountRepository, CatalogRepository, OrderRepository, RepositoryError,
    VerificationCodeRepository,
};
use crate::models::{
    Account, NewOrder, NewReceipt, Order, Product, ProductUpsert, Receipt, ReceiptReview,
};

#[derive(Default)]
struct Tables {
    next_id: i32,
    accounts: BTreeMap<AccountId, (Account, String)>,
    codes: HashMap<(AccountId, CodePurpose), CodeRecord>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    receipts: BTreeMap<ReceiptId, Receipt>,
}

impl Tables {
    const fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn code_by_id(&mut self, id: Uuid) -> Option<&mut CodeRecord> {
        self.codes.values_mut().find(|record| record.id == id)
    }

    fn account_by_email(&self, email: &Email) -> Option<&(Account, String)> {
        self.accounts
            .values()
            .find(|(account, _)| &account.email == email)
    }
}

/// Mutex-guarded storage implementing all repository traits.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn create_account(
        &self,
        email: &Email,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables.account_by_email(email).is_some() {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let account = Account {
            id: AccountId::new(tables.next_id()),
            email: email.clone(),
            role: AccountRole::Customer,
            verification_state: VerificationState::Unverified,
            created_at: now,
            updated_at: now,
        };
        tables
            .accounts
            .insert(account.id, (account.clone(), password_hash.to_owned()));

        Ok(account)
    }

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.accounts.get(&id).map(|(account, _)| account.clone()))
    }

    async fn account_by_email(&self, email: &Email) -> Result<Option<Account>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.account_by_email(email).map(|(account, _)| account.clone()))
    }

    async fn account_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(Account, String)>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.account_by_email(email).cloned())
    }

    async fn mark_verified(
        &self,
        id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some((account, _)) = tables.accounts.get_mut(&id) else {
            return Ok(false);
        };
        if account.verification_state != VerificationState::Unverified {
            return Ok(false);
        }

        account.verification_state = VerificationState::Verified;
        account.updated_at = now;
        Ok(true)
    }

    async fn set_password_hash(
        &self,
        id: AccountId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let (account, hash) = tables
            .accounts
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;

        password_hash.clone_into(hash);
        account.updated_at = now;
        Ok(())
    }

    async fn set_role(
        &self,
        email: &Email,
        role: AccountRole,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some((account, _)) = tables
            .accounts
            .values_mut()
            .find(|(account, _)| &account.email == email)
        else {
            return Ok(None);
        };

        account.role = role;
        account.updated_at = now;
        Ok(Some(account.clone()))
    }
}

#[async_trait]
impl VerificationCodeRepository for MemoryStore {
    async fn find_code(
        &self,
        account_id: AccountId,
        purpose: CodePurpose,
    ) -> Result<Option<CodeRecord>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.codes.get(&(account_id, purpose)).cloned())
    }

    async fn replace_code(
        &self,
        record: &CodeRecord,
        issued_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let key = (record.account_id, record.purpose);
        if let Some(existing) = tables.codes.get(&key)
            && existing.issued_at > issued_before
        {
            return Ok(false);
        }

        tables.codes.insert(key, record.clone());
        Ok(true)
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        expected_attempts: u32,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        match tables.code_by_id(id) {
            Some(record)
                if record.attempt_count == expected_attempts && record.consumed_at.is_none() =>
            {
                record.attempt_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_code(
        &self,
        id: Uuid,
        expected_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        match tables.code_by_id(id) {
            Some(record)
                if record.attempt_count == expected_attempts && record.consumed_at.is_none() =>
            {
                record.consumed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if !tables.accounts.contains_key(&order.account_id) {
            return Err(RepositoryError::NotFound);
        }

        let created = Order {
            id: OrderId::new(tables.next_id()),
            account_id: order.account_id,
            items: order.items.clone(),
            shipping: order.shipping.clone(),
            payment_method: order.payment_method,
            status: OrderStatus::Placed,
            payment_status: PaymentStatus::Pending,
            total: order.total,
            tracking_reference: None,
            created_at: order.created_at,
            updated_at: order.created_at,
        };
        tables.orders.insert(created.id, created.clone());

        Ok(created)
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn orders_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| order.account_id == account_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(orders)
    }

    async fn orders_awaiting_verification(&self) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| order.payment_status == PaymentStatus::AwaitingVerification)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));

        Ok(orders)
    }

    async fn apply_transition(
        &self,
        id: OrderId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(false);
        };
        if order.status != transition.from
            || order.payment_status != transition.expected_payment_status
        {
            return Ok(false);
        }

        order.status = transition.to;
        order.payment_status = transition.payment_status;
        if let Some(reference) = &transition.tracking_reference {
            order.tracking_reference = Some(reference.clone());
        }
        order.updated_at = now;
        Ok(true)
    }

    async fn attach_receipt(
        &self,
        receipt: &NewReceipt,
        expected_status: OrderStatus,
        expected_payment_status: PaymentStatus,
    ) -> Result<Option<Receipt>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let matches = tables.orders.get(&receipt.order_id).is_some_and(|order| {
            order.status == expected_status && order.payment_status == expected_payment_status
        });
        let has_active = tables
            .receipts
            .values()
            .any(|r| r.order_id == receipt.order_id && r.is_active());
        if !matches || has_active {
            return Ok(None);
        }

        let created = Receipt {
            id: ReceiptId::new(tables.next_id()),
            order_id: receipt.order_id,
            blob_ref: receipt.blob_ref.clone(),
            image_type: receipt.image_type,
            uploaded_by: receipt.uploaded_by,
            uploaded_at: receipt.uploaded_at,
            decision: None,
            rejection_reason: None,
            reviewer_id: None,
            reviewed_at: None,
        };
        tables.receipts.insert(created.id, created.clone());

        if let Some(order) = tables.orders.get_mut(&receipt.order_id) {
            order.payment_status = PaymentStatus::AwaitingVerification;
            order.updated_at = receipt.uploaded_at;
        }

        Ok(Some(created))
    }

    async fn record_review(
        &self,
        review: &ReceiptReview,
    ) -> Result<Option<Receipt>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let awaiting = tables
            .orders
            .get(&review.order_id)
            .is_some_and(|order| order.payment_status == PaymentStatus::AwaitingVerification);
        if !awaiting {
            return Ok(None);
        }

        let Some(receipt) = tables
            .receipts
            .values_mut()
            .find(|r| r.order_id == review.order_id && r.is_active())
        else {
            return Err(RepositoryError::DataCorruption(format!(
                "order {} awaiting verification without an active receipt",
                review.order_id
            )));
        };

        receipt.decision = Some(review.decision);
        receipt.rejection_reason.clone_from(&review.reason);
        receipt.reviewer_id = Some(review.reviewer_id);
        receipt.reviewed_at = Some(review.reviewed_at);
        let reviewed = receipt.clone();

        if let Some(order) = tables.orders.get_mut(&review.order_id) {
            order.payment_status = review.payment_status;
            order.updated_at = review.reviewed_at;
        }

        Ok(Some(reviewed))
    }

    async fn receipts_for_order(&self, order_id: OrderId) -> Result<Vec<Receipt>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .receipts
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn upsert_product(
        &self,
        product: &ProductUpsert,
        _now: DateTime<Utc>,
    ) -> Result<Product, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let existing = tables
            .products
            .values()
            .find(|p| p.slug == product.slug)
            .map(|p| p.id);
        let id = match existing {
            Some(id) => id,
            None => ProductId::new(tables.next_id()),
        };

        let stored = Product {
            id,
            slug: product.slug.clone(),
            title: product.title.clone(),
            price: product.price,
            active: product.active,
        };
        tables.products.insert(id, stored.clone());

        Ok(stored)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boxlane_core::CodePolicy;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000 + seconds, 0).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let email = Email::parse("sam@example.com").unwrap();
        store.create_account(&email, "hash", at(0)).await.unwrap();

        let err = store.create_account(&email, "hash", at(1)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_mark_verified_only_once() {
        let store = MemoryStore::new();
        let email = Email::parse("sam@example.com").unwrap();
        let account = store.create_account(&email, "hash", at(0)).await.unwrap();

        assert!(store.mark_verified(account.id, at(1)).await.unwrap());
        assert!(!store.mark_verified(account.id, at(2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_code_blocked_by_newer_issue() {
        let store = MemoryStore::new();
        let policy = CodePolicy::default();
        let account = AccountId::new(1);

        let first = CodeRecord::issue(account, CodePurpose::Registration, &policy, at(100));
        assert!(store.replace_code(&first, at(100)).await.unwrap());

        // A writer that observed nothing newer than t=50 loses.
        let stale = CodeRecord::issue(account, CodePurpose::Registration, &policy, at(101));
        assert!(!store.replace_code(&stale, at(50)).await.unwrap());

        let stored = store
            .find_code(account, CodePurpose::Registration)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, first.id);
    }

    #[tokio::test]
    async fn test_stale_attempt_write_is_rejected() {
        let store = MemoryStore::new();
        let record = CodeRecord::issue(
            AccountId::new(1),
            CodePurpose::PasswordReset,
            &CodePolicy::default(),
            at(0),
        );
        store.replace_code(&record, at(0)).await.unwrap();

        assert!(store.record_failed_attempt(record.id, 0).await.unwrap());
        assert!(!store.record_failed_attempt(record.id, 0).await.unwrap());
        assert!(!store.consume_code(record.id, 0, at(1)).await.unwrap());
        assert!(store.consume_code(record.id, 1, at(1)).await.unwrap());
    }
}
