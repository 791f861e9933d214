//! In-memory store used in mock mode and by the test suite.
//!
//! Mirrors the Postgres constraints: unique public tokens and unique
//! `(key, endpoint)` idempotency pairs surface as `UniqueViolation` with the
//! same constraint names, so the translation logic above it is exercised
//! identically.

use super::{
    BookingRequest, BookingStore, Decision, IdempotencyRecord, NewBooking, StoreError,
    IDEMPOTENCY_CONSTRAINT, PUBLIC_TOKEN_CONSTRAINT,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    bookings: Vec<BookingRequest>,
    idempotency: Vec<IdempotencyRecord>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens after a panic in another test thread.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn create_booking(&self, new: NewBooking) -> Result<BookingRequest, StoreError> {
        let mut inner = self.lock();

        if inner.bookings.iter().any(|b| b.public_token == new.public_token) {
            return Err(StoreError::UniqueViolation {
                constraint: PUBLIC_TOKEN_CONSTRAINT.to_string(),
            });
        }

        inner.next_id += 1;
        let booking = BookingRequest {
            id: inner.next_id,
            document_id: new.document_id,
            public_token: new.public_token,
            full_name: new.full_name,
            phone: new.phone,
            email: new.email,
            start_datetime: new.start_datetime,
            end_datetime: new.end_datetime,
            people_count: new.people_count,
            need_skipper: new.need_skipper,
            notes: new.notes,
            boat_id: new.boat_id,
            status: new.status,
            source_ip: new.source_ip,
            user_agent: new.user_agent,
            fingerprint: new.fingerprint,
            approved_at: None,
            decided_at: None,
            decision_note: None,
            published_at: new.published_at,
            created_at: Utc::now(),
        };
        inner.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn find_booking_by_id(&self, id: i64) -> Result<Option<BookingRequest>, StoreError> {
        Ok(self.lock().bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn find_booking_by_public_token(
        &self,
        token: &str,
    ) -> Result<Option<BookingRequest>, StoreError> {
        Ok(self
            .lock()
            .bookings
            .iter()
            .find(|b| b.public_token == token)
            .cloned())
    }

    async fn apply_decision(
        &self,
        id: i64,
        decision: Decision,
    ) -> Result<BookingRequest, StoreError> {
        let mut inner = self.lock();
        let booking = inner
            .bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(StoreError::RowNotFound)?;

        booking.status = decision.status;
        booking.approved_at = decision.approved_at;
        booking.decided_at = Some(decision.decided_at);
        booking.decision_note = decision.decision_note;
        Ok(booking.clone())
    }

    async fn delete_booking(&self, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.bookings.len();
        inner.bookings.retain(|b| b.id != id);
        Ok(inner.bookings.len() < before)
    }

    async fn delete_draft_siblings(
        &self,
        document_id: &str,
        keep_id: i64,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let before = inner.bookings.len();
        inner.bookings.retain(|b| {
            !(b.document_id == document_id && b.published_at.is_none() && b.id != keep_id)
        });
        Ok((before - inner.bookings.len()) as u64)
    }

    async fn find_published_sibling(
        &self,
        document_id: &str,
    ) -> Result<Option<i64>, StoreError> {
        Ok(self
            .lock()
            .bookings
            .iter()
            .find(|b| b.document_id == document_id && b.published_at.is_some())
            .map(|b| b.id))
    }

    async fn insert_idempotency(&self, record: IdempotencyRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner
            .idempotency
            .iter()
            .any(|r| r.key == record.key && r.endpoint == record.endpoint)
        {
            return Err(StoreError::UniqueViolation {
                constraint: IDEMPOTENCY_CONSTRAINT.to_string(),
            });
        }
        inner.idempotency.push(record);
        Ok(())
    }

    async fn find_idempotency(
        &self,
        key: &str,
        endpoint: &str,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        Ok(self
            .lock()
            .idempotency
            .iter()
            .find(|r| r.key == key && r.endpoint == endpoint)
            .cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BookingStatus;
    use chrono::Duration;

    fn booking(token: &str, document_id: &str) -> NewBooking {
        let start = Utc::now();
        NewBooking {
            document_id: document_id.to_string(),
            public_token: token.to_string(),
            full_name: "Ana Perovic".to_string(),
            phone: "+382 67 000 000".to_string(),
            email: None,
            start_datetime: start,
            end_datetime: start + Duration::hours(4),
            people_count: 2,
            need_skipper: false,
            notes: None,
            boat_id: Some(7),
            status: BookingStatus::New,
            source_ip: None,
            user_agent: None,
            fingerprint: None,
            published_at: Some(start),
        }
    }

    #[tokio::test]
    async fn duplicate_public_token_is_a_unique_violation() {
        let store = MemoryStore::new();
        store.create_booking(booking("tok-1", "doc-1")).await.unwrap();

        let err = store.create_booking(booking("tok-1", "doc-2")).await.unwrap_err();
        assert!(err.violates(PUBLIC_TOKEN_CONSTRAINT));
    }

    #[tokio::test]
    async fn idempotency_pair_is_unique_per_endpoint() {
        let store = MemoryStore::new();
        let record = IdempotencyRecord {
            key: "k1".to_string(),
            endpoint: "POST:/a".to_string(),
            request_hash: "h".to_string(),
            response_status: 201,
            response_body: serde_json::json!({"id": 1}),
            booking_id: Some(1),
            expires_at: Utc::now(),
        };

        store.insert_idempotency(record.clone()).await.unwrap();

        // Same key on a different endpoint is not a collision.
        let other = IdempotencyRecord {
            endpoint: "POST:/b".to_string(),
            ..record.clone()
        };
        store.insert_idempotency(other).await.unwrap();

        let err = store.insert_idempotency(record).await.unwrap_err();
        assert!(err.violates(IDEMPOTENCY_CONSTRAINT));
    }

    #[tokio::test]
    async fn decision_is_applied_in_place() {
        let store = MemoryStore::new();
        let created = store.create_booking(booking("tok-9", "doc-9")).await.unwrap();

        let now = Utc::now();
        let updated = store
            .apply_decision(
                created.id,
                Decision {
                    status: BookingStatus::Confirmed,
                    approved_at: Some(now),
                    decided_at: now,
                    decision_note: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, BookingStatus::Confirmed);
        assert_eq!(updated.approved_at, Some(now));
    }
}
