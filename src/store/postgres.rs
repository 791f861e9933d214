//! Postgres-backed store using sqlx.
//!
//! Unique-constraint violations (SQLSTATE 23505) are mapped to
//! `StoreError::UniqueViolation` carrying the constraint name so callers can
//! translate them into domain-level conflicts instead of leaking raw
//! database errors.

use super::{
    BookingRequest, BookingStatus, BookingStore, Decision, IdempotencyRecord, NewBooking,
    StoreError,
};
use crate::config::DatabaseConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct BookingRow {
    id: i64,
    document_id: String,
    public_token: String,
    full_name: String,
    phone: String,
    email: Option<String>,
    start_datetime: DateTime<Utc>,
    end_datetime: DateTime<Utc>,
    people_count: i32,
    need_skipper: bool,
    notes: Option<String>,
    boat_id: Option<i64>,
    status: String,
    source_ip: Option<String>,
    user_agent: Option<String>,
    fingerprint: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    decided_at: Option<DateTime<Utc>>,
    decision_note: Option<String>,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for BookingRequest {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, StoreError> {
        let status = BookingStatus::from_str(&row.status).map_err(StoreError::Database)?;
        Ok(BookingRequest {
            id: row.id,
            document_id: row.document_id,
            public_token: row.public_token,
            full_name: row.full_name,
            phone: row.phone,
            email: row.email,
            start_datetime: row.start_datetime,
            end_datetime: row.end_datetime,
            people_count: row.people_count,
            need_skipper: row.need_skipper,
            notes: row.notes,
            boat_id: row.boat_id,
            status,
            source_ip: row.source_ip,
            user_agent: row.user_agent,
            fingerprint: row.fingerprint,
            approved_at: row.approved_at,
            decided_at: row.decided_at,
            decision_note: row.decision_note,
            published_at: row.published_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct IdempotencyRow {
    key: String,
    endpoint: String,
    request_hash: String,
    response_status: i32,
    response_body: serde_json::Value,
    booking_id: Option<i64>,
    expires_at: DateTime<Utc>,
}

impl From<IdempotencyRow> for IdempotencyRecord {
    fn from(row: IdempotencyRow) -> Self {
        IdempotencyRecord {
            key: row.key,
            endpoint: row.endpoint,
            request_hash: row.request_hash,
            response_status: row.response_status,
            response_body: row.response_body,
            booking_id: row.booking_id,
            expires_at: row.expires_at,
        }
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return StoreError::UniqueViolation {
                constraint: db.constraint().unwrap_or_default().to_string(),
            };
        }
    }
    StoreError::Database(err.to_string())
}

const BOOKING_COLUMNS: &str = "id, document_id, public_token, full_name, phone, email, \
     start_datetime, end_datetime, people_count, need_skipper, notes, boat_id, status, \
     source_ip, user_agent, fingerprint, approved_at, decided_at, decision_note, \
     published_at, created_at";

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(&config.url)
            .await
            .map_err(map_sqlx)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn create_booking(&self, new: NewBooking) -> Result<BookingRequest, StoreError> {
        let sql = format!(
            "INSERT INTO booking_requests (document_id, public_token, full_name, phone, email, \
             start_datetime, end_datetime, people_count, need_skipper, notes, boat_id, status, \
             source_ip, user_agent, fingerprint, published_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {BOOKING_COLUMNS}"
        );

        let row: BookingRow = sqlx::query_as(&sql)
            .bind(&new.document_id)
            .bind(&new.public_token)
            .bind(&new.full_name)
            .bind(&new.phone)
            .bind(&new.email)
            .bind(new.start_datetime)
            .bind(new.end_datetime)
            .bind(new.people_count)
            .bind(new.need_skipper)
            .bind(&new.notes)
            .bind(new.boat_id)
            .bind(new.status.as_str())
            .bind(&new.source_ip)
            .bind(&new.user_agent)
            .bind(&new.fingerprint)
            .bind(new.published_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.try_into()
    }

    async fn find_booking_by_id(&self, id: i64) -> Result<Option<BookingRequest>, StoreError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM booking_requests WHERE id = $1");
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_booking_by_public_token(
        &self,
        token: &str,
    ) -> Result<Option<BookingRequest>, StoreError> {
        let sql =
            format!("SELECT {BOOKING_COLUMNS} FROM booking_requests WHERE public_token = $1");
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(TryInto::try_into).transpose()
    }

    async fn apply_decision(
        &self,
        id: i64,
        decision: Decision,
    ) -> Result<BookingRequest, StoreError> {
        let sql = format!(
            "UPDATE booking_requests \
             SET status = $2, approved_at = $3, decided_at = $4, decision_note = $5 \
             WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        );

        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(decision.status.as_str())
            .bind(decision.approved_at)
            .bind(decision.decided_at)
            .bind(&decision.decision_note)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.ok_or(StoreError::RowNotFound)?.try_into()
    }

    async fn delete_booking(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM booking_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_draft_siblings(
        &self,
        document_id: &str,
        keep_id: i64,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM booking_requests \
             WHERE document_id = $1 AND published_at IS NULL AND id <> $2",
        )
        .bind(document_id)
        .bind(keep_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn find_published_sibling(
        &self,
        document_id: &str,
    ) -> Result<Option<i64>, StoreError> {
        let id: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM booking_requests \
             WHERE document_id = $1 AND published_at IS NOT NULL LIMIT 1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(id.map(|(id,)| id))
    }

    async fn insert_idempotency(&self, record: IdempotencyRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO idempotency_keys \
             (key, endpoint, request_hash, response_status, response_body, booking_id, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.key)
        .bind(&record.endpoint)
        .bind(&record.request_hash)
        .bind(record.response_status)
        .bind(&record.response_body)
        .bind(record.booking_id)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find_idempotency(
        &self,
        key: &str,
        endpoint: &str,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let row: Option<IdempotencyRow> = sqlx::query_as(
            "SELECT key, endpoint, request_hash, response_status, response_body, booking_id, \
             expires_at FROM idempotency_keys WHERE key = $1 AND endpoint = $2",
        )
        .bind(key)
        .bind(endpoint)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(Into::into))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}
