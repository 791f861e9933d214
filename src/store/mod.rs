//! Persistence layer for booking requests and idempotency records.
//!
//! All coordination invariants (public-token uniqueness, idempotency-key
//! uniqueness, draft/publish reconciliation) are enforced through the store's
//! unique constraints plus single-row writes, never through in-process locks,
//! so multiple server instances can run against the same database.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Unique index guarding public tokens on `booking_requests`.
pub const PUBLIC_TOKEN_CONSTRAINT: &str = "booking_requests_public_token_uidx";

/// Unique constraint guarding `(key, endpoint)` on `idempotency_keys`.
pub const IDEMPOTENCY_CONSTRAINT: &str = "idempotency_keys_key_endpoint_key";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violation on {constraint}")]
    UniqueViolation { constraint: String },

    #[error("row not found")]
    RowNotFound,

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// True when this is a unique violation on the named constraint.
    pub fn violates(&self, name: &str) -> bool {
        matches!(self, Self::UniqueViolation { constraint } if constraint == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    New,
    Confirmed,
    Declined,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
        }
    }

    /// `confirmed` and `declined` are terminal; no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Declined)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "confirmed" => Ok(Self::Confirmed),
            "declined" => Ok(Self::Declined),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// A persisted booking request. `published_at == None` marks a draft row;
/// multiple rows may share one `document_id` transiently until reconciled.
#[derive(Debug, Clone, Serialize)]
pub struct BookingRequest {
    pub id: i64,
    pub document_id: String,
    pub public_token: String,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub people_count: i32,
    pub need_skipper: bool,
    pub notes: Option<String>,
    pub boat_id: Option<i64>,
    pub status: BookingStatus,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub fingerprint: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_note: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Field set for inserting a booking request.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub document_id: String,
    pub public_token: String,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub people_count: i32,
    pub need_skipper: bool,
    pub notes: Option<String>,
    pub boat_id: Option<i64>,
    pub status: BookingStatus,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub fingerprint: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Terminal-state update applied by the approval workflow.
#[derive(Debug, Clone)]
pub struct Decision {
    pub status: BookingStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub decided_at: DateTime<Utc>,
    pub decision_note: Option<String>,
}

/// Cached response for a retried submission. Expiry sweeping is a periodic
/// job outside the request path; the store only records `expires_at`.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub key: String,
    pub endpoint: String,
    pub request_hash: String,
    pub response_status: i32,
    pub response_body: serde_json::Value,
    pub booking_id: Option<i64>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create_booking(&self, new: NewBooking) -> Result<BookingRequest, StoreError>;

    async fn find_booking_by_id(&self, id: i64) -> Result<Option<BookingRequest>, StoreError>;

    async fn find_booking_by_public_token(
        &self,
        token: &str,
    ) -> Result<Option<BookingRequest>, StoreError>;

    async fn apply_decision(
        &self,
        id: i64,
        decision: Decision,
    ) -> Result<BookingRequest, StoreError>;

    async fn delete_booking(&self, id: i64) -> Result<bool, StoreError>;

    /// Delete every draft row sharing `document_id`, keeping `keep_id`.
    async fn delete_draft_siblings(
        &self,
        document_id: &str,
        keep_id: i64,
    ) -> Result<u64, StoreError>;

    /// Id of a published row for `document_id`, if one exists.
    async fn find_published_sibling(&self, document_id: &str)
        -> Result<Option<i64>, StoreError>;

    async fn insert_idempotency(&self, record: IdempotencyRecord) -> Result<(), StoreError>;

    async fn find_idempotency(
        &self,
        key: &str,
        endpoint: &str,
    ) -> Result<Option<IdempotencyRecord>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
