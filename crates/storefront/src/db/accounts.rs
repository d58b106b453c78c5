//! Account repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use boxlane_core::{AccountId, AccountRole, Email, VerificationState};

use super::{AccountRepository, RepositoryError, conflict_on_unique};
use crate::models::Account;

/// Row shape shared by every account query.
#[derive(sqlx::FromRow)]
struct AccountRow {
    id: AccountId,
    email: String,
    role: AccountRole,
    verification_state: VerificationState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = RepositoryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            email,
            role: row.role,
            verification_state: row.verification_state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AccountWithPasswordRow {
    #[sqlx(flatten)]
    account: AccountRow,
    password_hash: String,
}

const ACCOUNT_COLUMNS: &str = "id, email, role, verification_state, created_at, updated_at";

/// `PostgreSQL` account storage.
#[derive(Clone)]
pub struct PgAccounts {
    pool: PgPool,
}

impl PgAccounts {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccounts {
    async fn create_account(
        &self,
        email: &Email,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r"
            INSERT INTO storefront.account (email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            RETURNING {ACCOUNT_COLUMNS}
            "
        ))
        .bind(email.as_str())
        .bind(password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email already exists"))?;

        row.try_into()
    }

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM storefront.account WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn account_by_email(&self, email: &Email) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM storefront.account WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn account_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(Account, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, AccountWithPasswordRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS}, password_hash FROM storefront.account WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some((row.account.try_into()?, row.password_hash)))
    }

    async fn mark_verified(
        &self,
        id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.account
            SET verification_state = 'verified', updated_at = $2
            WHERE id = $1 AND verification_state = 'unverified'
            ",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_password_hash(
        &self,
        id: AccountId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.account
            SET password_hash = $2, updated_at = $3
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(password_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn set_role(
        &self,
        email: &Email,
        role: AccountRole,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r"
            UPDATE storefront.account
            SET role = $2, updated_at = $3
            WHERE email = $1
            RETURNING {ACCOUNT_COLUMNS}
            "
        ))
        .bind(email.as_str())
        .bind(role)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}
