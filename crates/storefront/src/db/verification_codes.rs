//! Verification code repository.
//!
//! The table holds one row per (account, purpose). Reissuing replaces the
//! row wholesale, including its `id`, which is the version token every
//! later write is keyed on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use boxlane_core::{AccountId, CodePurpose, CodeRecord, OneTimeCode};

use super::{RepositoryError, VerificationCodeRepository, to_i32, to_u32};

#[derive(sqlx::FromRow)]
struct CodeRow {
    id: Uuid,
    account_id: AccountId,
    purpose: CodePurpose,
    code: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    attempt_count: i32,
    max_attempts: i32,
    consumed_at: Option<DateTime<Utc>>,
}

impl TryFrom<CodeRow> for CodeRecord {
    type Error = RepositoryError;

    fn try_from(row: CodeRow) -> Result<Self, Self::Error> {
        let code = OneTimeCode::parse(&row.code).ok_or_else(|| {
            RepositoryError::DataCorruption(format!("malformed code for {}", row.id))
        })?;

        Ok(Self {
            id: row.id,
            account_id: row.account_id,
            purpose: row.purpose,
            code,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            attempt_count: to_u32(row.attempt_count, "attempt_count")?,
            max_attempts: to_u32(row.max_attempts, "max_attempts")?,
            consumed_at: row.consumed_at,
        })
    }
}

/// `PostgreSQL` verification code storage.
#[derive(Clone)]
pub struct PgVerificationCodes {
    pool: PgPool,
}

impl PgVerificationCodes {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationCodeRepository for PgVerificationCodes {
    async fn find_code(
        &self,
        account_id: AccountId,
        purpose: CodePurpose,
    ) -> Result<Option<CodeRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, CodeRow>(
            r"
            SELECT id, account_id, purpose, code, issued_at, expires_at,
                   attempt_count, max_attempts, consumed_at
            FROM storefront.verification_code
            WHERE account_id = $1 AND purpose = $2
            ",
        )
        .bind(account_id)
        .bind(purpose)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn replace_code(
        &self,
        record: &CodeRecord,
        issued_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO storefront.verification_code
                (account_id, purpose, id, code, issued_at, expires_at,
                 attempt_count, max_attempts, consumed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (account_id, purpose) DO UPDATE SET
                id = EXCLUDED.id,
                code = EXCLUDED.code,
                issued_at = EXCLUDED.issued_at,
                expires_at = EXCLUDED.expires_at,
                attempt_count = EXCLUDED.attempt_count,
                max_attempts = EXCLUDED.max_attempts,
                consumed_at = EXCLUDED.consumed_at
            WHERE storefront.verification_code.issued_at <= $10
            ",
        )
        .bind(record.account_id)
        .bind(record.purpose)
        .bind(record.id)
        .bind(record.code.as_str())
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(to_i32(record.attempt_count, "attempt_count")?)
        .bind(to_i32(record.max_attempts, "max_attempts")?)
        .bind(record.consumed_at)
        .bind(issued_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        expected_attempts: u32,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.verification_code
            SET attempt_count = attempt_count + 1
            WHERE id = $1 AND attempt_count = $2 AND consumed_at IS NULL
            ",
        )
        .bind(id)
        .bind(to_i32(expected_attempts, "attempt_count")?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn consume_code(
        &self,
        id: Uuid,
        expected_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.verification_code
            SET consumed_at = $3
            WHERE id = $1 AND attempt_count = $2 AND consumed_at IS NULL
            ",
        )
        .bind(id)
        .bind(to_i32(expected_attempts, "attempt_count")?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
