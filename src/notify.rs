//! Outbound email notification. Best-effort by contract: a failed send is
//! logged and swallowed, it never changes the outcome of the booking that
//! triggered it.

use crate::config::EmailConfig;
use crate::errors::AppError;
use crate::store::BookingRequest;
use async_trait::async_trait;

const RESEND_URL: &str = "https://api.resend.com/emails";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, from: &str, to: &str, subject: &str, text: &str)
        -> Result<(), AppError>;
}

/// Sends through the Resend HTTP API.
pub struct ResendNotifier {
    client: reqwest::Client,
    api_key: String,
}

impl ResendNotifier {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.resend_api_key.trim().to_string(),
        }
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        text: &str,
    ) -> Result<(), AppError> {
        let payload = serde_json::json!({
            "from": from,
            "to": to,
            "subject": subject,
            "text": text,
        });

        let response = self
            .client
            .post(RESEND_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("email send failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "email send failed: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Selected when no API key is configured; sending is disabled.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(
        &self,
        _from: &str,
        to: &str,
        subject: &str,
        _text: &str,
    ) -> Result<(), AppError> {
        tracing::debug!(%to, %subject, "email sending disabled, dropping notification");
        Ok(())
    }
}

/// Admin notification for a fresh booking request.
pub fn booking_admin_email(
    booking: &BookingRequest,
    boat_title: &str,
    boat_slug: &str,
) -> (String, String) {
    let subject = format!("New booking request: {boat_title}");

    let mut lines = vec![
        "New booking request".to_string(),
        String::new(),
        format!("Boat: {boat_title}"),
        format!("Slug: {boat_slug}"),
        format!("Request ID: {}", booking.id),
        String::new(),
        format!("Name: {}", booking.full_name),
        format!("Phone: {}", booking.phone),
    ];
    if let Some(email) = &booking.email {
        lines.push(format!("Email: {email}"));
    }
    lines.push(String::new());
    lines.push(format!("From: {}", booking.start_datetime.to_rfc3339()));
    lines.push(format!("To: {}", booking.end_datetime.to_rfc3339()));
    lines.push(format!("People: {}", booking.people_count));
    lines.push(format!(
        "Skipper: {}",
        if booking.need_skipper { "yes" } else { "no" }
    ));
    if let Some(notes) = &booking.notes {
        lines.push(String::new());
        lines.push(format!("Notes:\n{notes}"));
    }

    (subject, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BookingStatus;
    use chrono::{Duration, Utc};

    #[test]
    fn admin_email_includes_contact_and_dates() {
        let start = Utc::now();
        let booking = BookingRequest {
            id: 42,
            document_id: "doc".into(),
            public_token: "tok".into(),
            full_name: "Ana Perovic".into(),
            phone: "+382 67 000 000".into(),
            email: Some("ana@example.com".into()),
            start_datetime: start,
            end_datetime: start + Duration::hours(4),
            people_count: 3,
            need_skipper: true,
            notes: Some("anchor at Sveti Stefan".into()),
            boat_id: Some(7),
            status: BookingStatus::New,
            source_ip: None,
            user_agent: None,
            fingerprint: None,
            approved_at: None,
            decided_at: None,
            decision_note: None,
            published_at: Some(start),
            created_at: start,
        };

        let (subject, text) = booking_admin_email(&booking, "Bavaria 38", "bavaria-38");
        assert_eq!(subject, "New booking request: Bavaria 38");
        assert!(text.contains("Request ID: 42"));
        assert!(text.contains("Ana Perovic"));
        assert!(text.contains("Skipper: yes"));
        assert!(text.contains("anchor at Sveti Stefan"));
    }
}
