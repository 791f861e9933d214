//! Booking-request creation pipelines: the public storefront submission, the
//! generic create, and the idempotent create.
//!
//! Pipeline order matters: validation and the anti-abuse gate run strictly
//! before any persistence or catalog lookup so abusive traffic costs as
//! little as possible.

use crate::catalog::BoatCatalog;
use crate::config::{AppConfig, EmailConfig};
use crate::errors::AppError;
use crate::notify::{booking_admin_email, Notifier};
use crate::services::dedup;
use crate::store::{
    BookingRequest, BookingStatus, BookingStore, IdempotencyRecord, NewBooking,
    IDEMPOTENCY_CONSTRAINT, PUBLIC_TOKEN_CONSTRAINT,
};
use crate::util::{hash, time as timeutil};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Endpoint discriminator for idempotency records; the same key on another
/// endpoint is not a collision.
pub const IDEMPOTENT_ENDPOINT: &str = "POST:/api/booking-requests-idempotent";

const DEFAULT_TIME_FROM: &str = "10:00";
const DEFAULT_TIME_TO: &str = "14:00";

/// Storefront submission body. Every field optional at the parse stage so
/// presence checks produce one message per first-failing field instead of a
/// serde error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IntakePayload {
    #[serde(rename = "boatSlug")]
    pub boat_slug: Option<String>,
    #[serde(rename = "boatTitle")]
    pub boat_title: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "dateFrom")]
    pub date_from: Option<String>,
    #[serde(rename = "dateTo")]
    pub date_to: Option<String>,
    #[serde(rename = "timeFrom")]
    pub time_from: Option<String>,
    #[serde(rename = "timeTo")]
    pub time_to: Option<String>,
    #[serde(rename = "peopleCount")]
    pub people_count: Option<f64>,
    #[serde(rename = "needSkipper")]
    pub need_skipper: Option<bool>,
    pub message: Option<String>,
    #[serde(rename = "publicToken")]
    pub public_token: Option<String>,
    /// Honeypot. Hidden in the form; humans leave it empty.
    pub hp: Option<String>,
    /// Client-reported submission-start epoch millis.
    pub client_ts: Option<i64>,
}

/// Validated and normalized submission.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub boat_slug: String,
    pub boat_title: String,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub people_count: i32,
    pub need_skipper: bool,
    pub message: Option<String>,
    pub public_token: Option<String>,
}

/// Generic create body (snake_case, content-store field names).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenericCreate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
    pub people_count: Option<f64>,
    pub need_skipper: Option<bool>,
    pub notes: Option<String>,
    pub boat: Option<i64>,
    pub public_token: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub fingerprint: Option<String>,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Anti-abuse drop, reported to the caller as a success with id 0.
    Dropped { token: String },
    Created { booking: BookingRequest },
}

#[derive(Debug)]
pub struct IdempotentReply {
    pub status: u16,
    pub body: Value,
    /// `Some(true)` replayed, `Some(false)` fresh creation, `None` when the
    /// replay header does not apply (e.g. token conflict).
    pub replayed: Option<bool>,
}

/// Bodies may arrive wrapped in a `data` envelope; unwrap if so.
pub fn unwrap_envelope(body: &Value) -> Value {
    match body.get("data") {
        Some(data @ Value::Object(_)) => data.clone(),
        _ => body.clone(),
    }
}

fn required(value: Option<&String>, name: &str) -> Result<String, AppError> {
    match value.map(|s| s.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::Validation(format!("{name} is required"))),
    }
}

fn optional(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn floor_people(value: Option<f64>) -> i32 {
    match value {
        Some(n) if n >= 1.0 => n.floor() as i32,
        _ => 1,
    }
}

/// Validates a parsed payload into a normalized request. Short-circuits on
/// the first failing check.
pub fn validate(payload: &IntakePayload, tz: Tz) -> Result<NormalizedRequest, AppError> {
    let boat_slug = required(payload.boat_slug.as_ref(), "boatSlug")?;
    let boat_title = required(payload.boat_title.as_ref(), "boatTitle")?;
    let full_name = required(payload.name.as_ref(), "name")?;
    let phone = required(payload.phone.as_ref(), "phone")?;
    let date_from = required(payload.date_from.as_ref(), "dateFrom")?;
    let date_to = required(payload.date_to.as_ref(), "dateTo")?;

    let time_from = optional(payload.time_from.as_ref())
        .unwrap_or_else(|| DEFAULT_TIME_FROM.to_string());
    let time_to =
        optional(payload.time_to.as_ref()).unwrap_or_else(|| DEFAULT_TIME_TO.to_string());

    let start_utc = timeutil::local_to_utc(
        timeutil::parse_date(&date_from)?,
        timeutil::parse_clock(&time_from)?,
        tz,
    );
    let end_utc = timeutil::local_to_utc(
        timeutil::parse_date(&date_to)?,
        timeutil::parse_clock(&time_to)?,
        tz,
    );

    if end_utc <= start_utc {
        return Err(AppError::Validation(
            "dateTo must be after dateFrom".to_string(),
        ));
    }

    Ok(NormalizedRequest {
        boat_slug,
        boat_title,
        full_name,
        phone,
        email: optional(payload.email.as_ref()),
        start_utc,
        end_utc,
        people_count: floor_people(payload.people_count),
        need_skipper: payload.need_skipper.unwrap_or(false),
        message: optional(payload.message.as_ref()),
        public_token: optional(payload.public_token.as_ref()),
    })
}

pub struct IntakeService {
    store: Arc<dyn BookingStore>,
    catalog: Arc<dyn BoatCatalog>,
    notifier: Arc<dyn Notifier>,
    tz: Tz,
    min_fill_ms: i64,
    idempotency_ttl: Duration,
    email: EmailConfig,
}

impl IntakeService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        catalog: Arc<dyn BoatCatalog>,
        notifier: Arc<dyn Notifier>,
        tz: Tz,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            notifier,
            tz,
            min_fill_ms: config.booking.min_fill_ms,
            idempotency_ttl: Duration::hours(config.booking.idempotency_ttl_hours),
            email: config.email.clone(),
        }
    }

    /// Anti-abuse gate. Negative or missing fill-time delta never triggers
    /// the min-fill check (clock-skew tolerance).
    fn is_automated(&self, payload: &IntakePayload, now_ms: i64) -> bool {
        if payload.hp.as_deref().map(str::trim).is_some_and(|v| !v.is_empty()) {
            return true;
        }
        if let Some(client_ts) = payload.client_ts {
            let delta = now_ms - client_ts;
            if (0..self.min_fill_ms).contains(&delta) {
                return true;
            }
        }
        false
    }

    /// Public storefront submission (`POST /request`).
    pub async fn submit(
        &self,
        body: &Value,
        source_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<SubmitOutcome, AppError> {
        let data = unwrap_envelope(body);
        let payload: IntakePayload = serde_json::from_value(data)
            .map_err(|e| AppError::Validation(format!("invalid payload: {e}")))?;

        let normalized = validate(&payload, self.tz)?;
        let token = normalized
            .public_token
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let now = Utc::now();
        if self.is_automated(&payload, now.timestamp_millis()) {
            tracing::info!(boat_slug = %normalized.boat_slug, "dropping automated submission");
            return Ok(SubmitOutcome::Dropped { token });
        }

        let boat_id = self
            .catalog
            .boat_id_by_slug(&normalized.boat_slug)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Boat not found by slug: {}", normalized.boat_slug))
            })?;

        let fingerprint = hash::fingerprint(
            source_ip.as_deref().unwrap_or(""),
            user_agent.as_deref().unwrap_or(""),
            &normalized.boat_slug,
            &timeutil::utc_date_stamp(now),
        );

        let booking = self
            .store
            .create_booking(NewBooking {
                document_id: Uuid::new_v4().to_string(),
                public_token: token,
                full_name: normalized.full_name.clone(),
                phone: normalized.phone.clone(),
                email: normalized.email.clone(),
                start_datetime: normalized.start_utc,
                end_datetime: normalized.end_utc,
                people_count: normalized.people_count,
                need_skipper: normalized.need_skipper,
                notes: normalized.message.clone(),
                boat_id: Some(boat_id),
                status: BookingStatus::New,
                source_ip,
                user_agent,
                fingerprint: Some(fingerprint),
                published_at: Some(now),
            })
            .await
            .map_err(|e| {
                if e.violates(PUBLIC_TOKEN_CONSTRAINT) {
                    AppError::Conflict("public_token already exists".to_string())
                } else {
                    e.into()
                }
            })?;

        dedup::reconcile_after_create(
            self.store.as_ref(),
            booking.id,
            &booking.document_id,
            booking.published_at,
        )
        .await;

        self.notify_admin(&booking, &normalized.boat_title, &normalized.boat_slug);

        Ok(SubmitOutcome::Created { booking })
    }

    /// Generic create (`POST /booking-requests`).
    pub async fn create(&self, body: &Value) -> Result<BookingRequest, AppError> {
        let data = unwrap_envelope(body);
        let payload: GenericCreate = serde_json::from_value(data)
            .map_err(|e| AppError::Validation(format!("invalid payload: {e}")))?;

        let full_name = required(payload.full_name.as_ref(), "full_name")?;
        let phone = required(payload.phone.as_ref(), "phone")?;

        let start = parse_instant(payload.start_datetime.as_deref(), "start_datetime")?;
        let end = parse_instant(payload.end_datetime.as_deref(), "end_datetime")?;
        if end <= start {
            return Err(AppError::Validation(
                "end_datetime must be after start_datetime".to_string(),
            ));
        }

        let token = optional(payload.public_token.as_ref())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let booking = self
            .store
            .create_booking(NewBooking {
                document_id: Uuid::new_v4().to_string(),
                public_token: token,
                full_name,
                phone,
                email: optional(payload.email.as_ref()),
                start_datetime: start,
                end_datetime: end,
                people_count: floor_people(payload.people_count),
                need_skipper: payload.need_skipper.unwrap_or(false),
                notes: optional(payload.notes.as_ref()),
                boat_id: payload.boat,
                status: BookingStatus::New,
                source_ip: optional(payload.source_ip.as_ref()),
                user_agent: optional(payload.user_agent.as_ref()),
                fingerprint: optional(payload.fingerprint.as_ref()),
                published_at: Some(Utc::now()),
            })
            .await
            .map_err(|e| {
                if e.violates(PUBLIC_TOKEN_CONSTRAINT) {
                    AppError::Conflict("public_token already exists".to_string())
                } else {
                    e.into()
                }
            })?;

        dedup::reconcile_after_create(
            self.store.as_ref(),
            booking.id,
            &booking.document_id,
            booking.published_at,
        )
        .await;

        Ok(booking)
    }

    /// Idempotent create (`POST /booking-requests-idempotent`). Exactly one
    /// logical creation per `(key, endpoint)`; concurrent callers converge on
    /// the winner's result.
    pub async fn idempotent_create(
        &self,
        key: &str,
        body: &Value,
    ) -> Result<IdempotentReply, AppError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::MissingIdempotencyKey);
        }

        let data = unwrap_envelope(body);
        let request_hash = hash::stable_hash(&data);

        if let Some(existing) = self.store.find_idempotency(key, IDEMPOTENT_ENDPOINT).await? {
            return self.replay(existing, &request_hash).await;
        }

        let created = match self.create(body).await {
            Ok(booking) => booking,
            Err(AppError::Conflict(message)) => {
                // Resubmission with the same public token: point at the row
                // that already exists instead of erroring opaquely.
                let existing_id = match data.get("public_token").and_then(Value::as_str) {
                    Some(token) => self
                        .store
                        .find_booking_by_public_token(token.trim())
                        .await?
                        .map(|b| b.id),
                    None => None,
                };
                return Ok(IdempotentReply {
                    status: 409,
                    body: json!({ "error": message, "existing_id": existing_id }),
                    replayed: None,
                });
            }
            Err(e) => return Err(e),
        };

        let record = IdempotencyRecord {
            key: key.to_string(),
            endpoint: IDEMPOTENT_ENDPOINT.to_string(),
            request_hash: request_hash.clone(),
            response_status: 201,
            response_body: json!({ "id": created.id }),
            booking_id: Some(created.id),
            expires_at: Utc::now() + self.idempotency_ttl,
        };

        match self.store.insert_idempotency(record).await {
            Ok(()) => Ok(IdempotentReply {
                status: 201,
                body: booking_json(&created),
                replayed: Some(false),
            }),
            Err(e) if e.violates(IDEMPOTENCY_CONSTRAINT) => {
                // Lost the insert race: converge on the winner's record.
                let raced = self
                    .store
                    .find_idempotency(key, IDEMPOTENT_ENDPOINT)
                    .await?
                    .ok_or(AppError::Store(e))?;
                self.replay(raced, &request_hash).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn replay(
        &self,
        existing: IdempotencyRecord,
        request_hash: &str,
    ) -> Result<IdempotentReply, AppError> {
        if existing.request_hash != request_hash {
            return Err(AppError::IdempotencyConflict);
        }

        // Re-resolve the booking so the replay reflects mutations made since
        // creation (an approval, for instance), not the stale snapshot.
        let mut body = existing.response_body.clone();
        if let Some(booking_id) = existing.booking_id {
            if let Some(booking) = self.store.find_booking_by_id(booking_id).await? {
                body = booking_json(&booking);
            }
        }

        let status = u16::try_from(existing.response_status).unwrap_or(200);
        Ok(IdempotentReply {
            status: if status == 0 { 200 } else { status },
            body,
            replayed: Some(true),
        })
    }

    fn notify_admin(&self, booking: &BookingRequest, boat_title: &str, boat_slug: &str) {
        let to = self.email.notify_to.trim().to_string();
        if to.is_empty() {
            return;
        }

        let (subject, text) = booking_admin_email(booking, boat_title, boat_slug);
        let from = self.email.notify_from.clone();
        let notifier = self.notifier.clone();
        let booking_id = booking.id;

        tokio::spawn(async move {
            if let Err(e) = notifier.send(&from, &to, &subject, &text).await {
                tracing::error!(booking_id, error = %e, "EMAIL_SEND_FAILED");
            }
        });
    }
}

fn parse_instant(value: Option<&str>, name: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = value.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
        AppError::Validation(format!("{name} must be a valid datetime"))
    })?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::InvalidDateOrTime(format!("{name} must be a valid datetime")))
}

fn booking_json(booking: &BookingRequest) -> Value {
    serde_json::to_value(booking).unwrap_or_else(|_| json!({ "id": booking.id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::notify::NoopNotifier;
    use crate::store::memory::MemoryStore;
    use chrono_tz::Europe::Podgorica;
    use std::collections::HashMap;

    fn service() -> (IntakeService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut boats = HashMap::new();
        boats.insert("bavaria-38".to_string(), 7_i64);
        let catalog = Arc::new(StaticCatalog::new(boats));

        let config = AppConfig::build().expect("defaults");
        let svc = IntakeService::new(
            store.clone(),
            catalog,
            Arc::new(NoopNotifier),
            Podgorica,
            &config,
        );
        (svc, store)
    }

    fn submission() -> Value {
        json!({
            "boatSlug": "bavaria-38",
            "boatTitle": "Bavaria 38",
            "name": "Ana Perovic",
            "phone": "+382 67 000 000",
            "dateFrom": "2025-07-10",
            "dateTo": "2025-07-10",
            "timeFrom": "10:00",
            "timeTo": "14:00",
            "peopleCount": 4.7,
        })
    }

    fn generic_body(token: &str) -> Value {
        json!({
            "data": {
                "full_name": "Ana Perovic",
                "phone": "+382 67 000 000",
                "start_datetime": "2025-07-10T08:00:00Z",
                "end_datetime": "2025-07-10T12:00:00Z",
                "boat": 7,
                "public_token": token,
            }
        })
    }

    #[tokio::test]
    async fn valid_submission_creates_a_new_booking() {
        let (svc, _store) = service();
        let outcome = svc.submit(&submission(), Some("10.0.0.1".into()), None).await.unwrap();

        let SubmitOutcome::Created { booking } = outcome else {
            panic!("expected a created booking");
        };
        assert_eq!(booking.status, BookingStatus::New);
        assert_eq!(booking.boat_id, Some(7));
        assert_eq!(booking.people_count, 4); // floored
        assert!(booking.fingerprint.is_some());
        assert!(booking.published_at.is_some());
        assert!(booking.end_datetime > booking.start_datetime);
    }

    #[tokio::test]
    async fn missing_required_field_fails_validation() {
        let (svc, _) = service();
        let mut body = submission();
        body.as_object_mut().unwrap().remove("phone");

        let err = svc.submit(&body, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("phone")));
    }

    #[tokio::test]
    async fn end_before_start_fails_validation() {
        let (svc, _) = service();
        let mut body = submission();
        body["timeFrom"] = json!("14:00");
        body["timeTo"] = json!("10:00");

        let err = svc.submit(&body, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn dst_gap_still_orders_start_before_end() {
        let (svc, _) = service();
        let mut body = submission();
        body["dateFrom"] = json!("2025-03-30");
        body["dateTo"] = json!("2025-03-30");
        body["timeFrom"] = json!("01:30");
        body["timeTo"] = json!("05:00");

        let SubmitOutcome::Created { booking } = svc.submit(&body, None, None).await.unwrap()
        else {
            panic!("expected a created booking");
        };
        // 3.5 wall-clock hours minus the skipped DST hour.
        assert_eq!((booking.end_datetime - booking.start_datetime).num_minutes(), 150);
    }

    #[tokio::test]
    async fn honeypot_drops_silently_without_persisting() {
        let (svc, store) = service();
        let mut body = submission();
        body["hp"] = json!("http://spam.example");

        let outcome = svc.submit(&body, None, None).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Dropped { .. }));
        assert!(store.find_booking_by_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn instant_submission_drops_silently() {
        let (svc, store) = service();
        let mut body = submission();
        body["client_ts"] = json!(Utc::now().timestamp_millis() - 300);

        let outcome = svc.submit(&body, None, None).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Dropped { .. }));
        assert!(store.find_booking_by_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skewed_client_clock_does_not_drop() {
        let (svc, _) = service();
        let mut body = submission();
        // Client clock ahead of the server: negative delta, filter must pass.
        body["client_ts"] = json!(Utc::now().timestamp_millis() + 60_000);

        let outcome = svc.submit(&body, None, None).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Created { .. }));
    }

    #[tokio::test]
    async fn unknown_slug_is_not_found() {
        let (svc, _) = service();
        let mut body = submission();
        body["boatSlug"] = json!("ghost-ship");

        let err = svc.submit(&body, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_public_token_is_a_conflict() {
        let (svc, _) = service();
        let mut body = submission();
        body["publicToken"] = json!("tok-dup");

        assert!(matches!(
            svc.submit(&body, None, None).await.unwrap(),
            SubmitOutcome::Created { .. }
        ));
        let err = svc.submit(&body, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn distinct_keys_create_distinct_bookings() {
        let (svc, _) = service();
        let a = svc.idempotent_create("key-a", &generic_body("tok-a")).await.unwrap();
        let b = svc.idempotent_create("key-b", &generic_body("tok-b")).await.unwrap();

        assert_eq!(a.status, 201);
        assert_eq!(b.status, 201);
        assert_ne!(a.body["id"], b.body["id"]);
    }

    #[tokio::test]
    async fn same_key_same_body_replays_one_booking() {
        let (svc, store) = service();
        let first = svc.idempotent_create("key-1", &generic_body("tok-1")).await.unwrap();
        assert_eq!(first.replayed, Some(false));

        let second = svc.idempotent_create("key-1", &generic_body("tok-1")).await.unwrap();
        assert_eq!(second.replayed, Some(true));
        assert_eq!(second.body["id"], first.body["id"]);

        // Only one row was ever created.
        let id = first.body["id"].as_i64().unwrap();
        assert!(store.find_booking_by_id(id).await.unwrap().is_some());
        assert!(store.find_booking_by_id(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replay_body_hash_is_key_order_insensitive() {
        let (svc, _) = service();
        svc.idempotent_create("key-1", &generic_body("tok-1")).await.unwrap();

        // Same fields, different key order.
        let reordered = json!({
            "data": {
                "public_token": "tok-1",
                "boat": 7,
                "end_datetime": "2025-07-10T12:00:00Z",
                "start_datetime": "2025-07-10T08:00:00Z",
                "phone": "+382 67 000 000",
                "full_name": "Ana Perovic",
            }
        });
        let reply = svc.idempotent_create("key-1", &reordered).await.unwrap();
        assert_eq!(reply.replayed, Some(true));
    }

    #[tokio::test]
    async fn same_key_different_body_is_a_conflict() {
        let (svc, store) = service();
        let first = svc.idempotent_create("key-1", &generic_body("tok-1")).await.unwrap();

        let mut other = generic_body("tok-other");
        other["data"]["phone"] = json!("+382 69 999 999");

        let err = svc.idempotent_create("key-1", &other).await.unwrap_err();
        assert!(matches!(err, AppError::IdempotencyConflict));

        // No second record.
        let id = first.body["id"].as_i64().unwrap();
        assert!(store.find_booking_by_id(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_idempotency_key_is_rejected() {
        let (svc, _) = service();
        let err = svc.idempotent_create("  ", &generic_body("tok-1")).await.unwrap_err();
        assert!(matches!(err, AppError::MissingIdempotencyKey));
    }

    #[tokio::test]
    async fn token_conflict_reports_the_existing_row() {
        let (svc, _) = service();
        let first = svc.idempotent_create("key-1", &generic_body("tok-1")).await.unwrap();

        // Different key, same public token.
        let reply = svc.idempotent_create("key-2", &generic_body("tok-1")).await.unwrap();
        assert_eq!(reply.status, 409);
        assert_eq!(reply.replayed, None);
        assert_eq!(reply.body["existing_id"], first.body["id"]);
    }

    #[tokio::test]
    async fn insert_race_loser_replays_the_winner() {
        let (svc, store) = service();
        let body = generic_body("tok-1");

        // Simulate the winner committing its record between our lookup miss
        // and our insert by pre-seeding the idempotency row.
        let data = unwrap_envelope(&body);
        let request_hash = hash::stable_hash(&data);
        let winner = svc.create(&body).await.unwrap();
        store
            .insert_idempotency(IdempotencyRecord {
                key: "key-r".to_string(),
                endpoint: IDEMPOTENT_ENDPOINT.to_string(),
                request_hash,
                response_status: 201,
                response_body: json!({ "id": winner.id }),
                booking_id: Some(winner.id),
                expires_at: Utc::now() + Duration::hours(24),
            })
            .await
            .unwrap();

        let mut retry = body.clone();
        retry["data"]["public_token"] = json!("tok-2");
        // Different token, same key: hash differs, so this is a conflict.
        let err = svc.idempotent_create("key-r", &retry).await.unwrap_err();
        assert!(matches!(err, AppError::IdempotencyConflict));

        // Identical body converges on the winner's booking.
        let reply = svc.idempotent_create("key-r", &body).await.unwrap();
        assert_eq!(reply.replayed, Some(true));
        assert_eq!(reply.body["id"], json!(winner.id));
    }

    #[tokio::test]
    async fn generic_create_rejects_inverted_datetimes() {
        let (svc, _) = service();
        let mut body = generic_body("tok-1");
        body["data"]["end_datetime"] = json!("2025-07-10T07:00:00Z");

        let err = svc.create(&body).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
