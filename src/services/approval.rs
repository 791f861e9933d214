//! Owner approve/decline workflow.
//!
//! `new` is the only non-terminal state; `confirmed` and `declined` are
//! terminal and mutually exclusive. A transition attempt on a terminal row
//! answers `Conflict` rather than silently doing nothing, so callers learn
//! the action had no effect. The shared secret is injected at construction,
//! not read from ambient process state.

use crate::errors::AppError;
use crate::store::{BookingRequest, BookingStatus, BookingStore, Decision};
use chrono::Utc;
use std::sync::Arc;

pub struct ApprovalService {
    store: Arc<dyn BookingStore>,
    owner_token: String,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn BookingStore>, owner_token: String) -> Self {
        Self { store, owner_token }
    }

    fn authorize(&self, provided: Option<&str>) -> Result<(), AppError> {
        let expected = self.owner_token.trim();
        if expected.is_empty() {
            return Err(AppError::ServerMisconfigured(
                "missing owner action token".to_string(),
            ));
        }

        let got = provided.unwrap_or("").trim();
        if got.is_empty() || got != expected {
            return Err(AppError::Unauthorized);
        }
        Ok(())
    }

    async fn load(&self, public_token: &str) -> Result<BookingRequest, AppError> {
        let token = public_token.trim();
        if token.is_empty() {
            return Err(AppError::Validation("Missing token".to_string()));
        }

        self.store
            .find_booking_by_public_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking request not found".to_string()))
    }

    pub async fn approve(
        &self,
        provided_token: Option<&str>,
        public_token: &str,
    ) -> Result<BookingRequest, AppError> {
        self.authorize(provided_token)?;

        let existing = self.load(public_token).await?;
        if existing.status.is_terminal() {
            return Err(AppError::Conflict("Final state; cannot approve".to_string()));
        }

        let now = Utc::now();
        let updated = self
            .store
            .apply_decision(
                existing.id,
                Decision {
                    status: BookingStatus::Confirmed,
                    approved_at: Some(now),
                    decided_at: now,
                    decision_note: None,
                },
            )
            .await?;

        tracing::info!(booking_id = updated.id, "booking request confirmed");
        Ok(updated)
    }

    pub async fn decline(
        &self,
        provided_token: Option<&str>,
        public_token: &str,
        note: Option<String>,
    ) -> Result<BookingRequest, AppError> {
        self.authorize(provided_token)?;

        let existing = self.load(public_token).await?;
        if existing.status.is_terminal() {
            return Err(AppError::Conflict("Final state; cannot decline".to_string()));
        }

        let updated = self
            .store
            .apply_decision(
                existing.id,
                Decision {
                    status: BookingStatus::Declined,
                    approved_at: None,
                    decided_at: Utc::now(),
                    decision_note: note,
                },
            )
            .await?;

        tracing::info!(booking_id = updated.id, "booking request declined");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::NewBooking;
    use chrono::Duration;

    const SECRET: &str = "owner-secret";

    async fn service_with_booking() -> (ApprovalService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let start = Utc::now();
        store
            .create_booking(NewBooking {
                document_id: "doc-1".to_string(),
                public_token: "tok-1".to_string(),
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
            })
            .await
            .unwrap();

        (
            ApprovalService::new(store.clone(), SECRET.to_string()),
            store,
        )
    }

    #[tokio::test]
    async fn approve_transitions_to_confirmed_once() {
        let (svc, _) = service_with_booking().await;

        let updated = svc.approve(Some(SECRET), "tok-1").await.unwrap();
        assert_eq!(updated.status, BookingStatus::Confirmed);
        assert!(updated.approved_at.is_some());
        assert!(updated.decided_at.is_some());

        let err = svc.approve(Some(SECRET), "tok-1").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn decline_stores_the_note() {
        let (svc, _) = service_with_booking().await;

        let updated = svc
            .decline(Some(SECRET), "tok-1", Some("boat in maintenance".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.status, BookingStatus::Declined);
        assert_eq!(updated.decision_note.as_deref(), Some("boat in maintenance"));
        assert!(updated.approved_at.is_none());
    }

    #[tokio::test]
    async fn terminal_states_never_flip() {
        let (svc, store) = service_with_booking().await;

        svc.decline(Some(SECRET), "tok-1", None).await.unwrap();
        let err = svc.approve(Some(SECRET), "tok-1").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let row = store.find_booking_by_public_token("tok-1").await.unwrap().unwrap();
        assert_eq!(row.status, BookingStatus::Declined);
    }

    #[tokio::test]
    async fn wrong_or_missing_token_is_unauthorized() {
        let (svc, _) = service_with_booking().await;

        assert!(matches!(
            svc.approve(Some("nope"), "tok-1").await.unwrap_err(),
            AppError::Unauthorized
        ));
        assert!(matches!(
            svc.approve(None, "tok-1").await.unwrap_err(),
            AppError::Unauthorized
        ));
    }

    #[tokio::test]
    async fn unset_secret_is_a_server_error() {
        let store = Arc::new(MemoryStore::new());
        let svc = ApprovalService::new(store, String::new());

        let err = svc.approve(Some("anything"), "tok-1").await.unwrap_err();
        assert!(matches!(err, AppError::ServerMisconfigured(_)));
    }

    #[tokio::test]
    async fn unknown_public_token_is_not_found() {
        let (svc, _) = service_with_booking().await;
        let err = svc.approve(Some(SECRET), "ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
