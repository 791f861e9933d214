//! Public storefront intake endpoint.
//!
//! Responses here are consumed by a browser form, so the shape stays small:
//! `{ok, id, token}` on success, `{ok, error, fallbackMailto?}` on failure.
//! Every response carries `Cache-Control: no-store`; intermediaries must not
//! replay a submission result to another visitor.

use crate::services::intake::SubmitOutcome;
use crate::services::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Value};

// Matches JS encodeURIComponent: everything percent-encoded except the
// unreserved marks.
const MAILTO_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub async fn submit_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return no_store(
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"ok": false, "error": "Invalid JSON"})),
            )
                .into_response(),
        );
    };

    let source_ip = client_ip(&headers);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let response = match state.intake.submit(&body, source_ip, user_agent).await {
        Ok(SubmitOutcome::Dropped { token }) => (
            StatusCode::OK,
            Json(json!({"ok": true, "id": 0, "token": token})),
        )
            .into_response(),
        Ok(SubmitOutcome::Created { booking }) => (
            StatusCode::OK,
            Json(json!({"ok": true, "id": booking.id, "token": booking.public_token})),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "storefront booking request failed");
            let mut payload = json!({"ok": false, "error": e.to_string()});
            if let Some(mailto) = fallback_mailto(&state.fallback_mailto, &body) {
                payload["fallbackMailto"] = Value::String(mailto);
            }
            (e.status_code(), Json(payload)).into_response()
        }
    };
    no_store(response)
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// First address in `x-forwarded-for`, falling back to `x-real-ip`. The
/// service sits behind a reverse proxy in every deployment.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Pre-filled mailto: link so the visitor can still reach the crew when the
/// automated path fails. Built from whatever fields the raw body carried.
fn fallback_mailto(to: &str, body: &Value) -> Option<String> {
    if to.trim().is_empty() {
        return None;
    }
    let data = crate::services::intake::unwrap_envelope(body);
    let field = |name: &str| {
        data.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let boat_title = field("boatTitle").unwrap_or("boat");
    let subject = format!("Boat request: {boat_title}");

    let mut lines = vec![format!("Boat: {boat_title}")];
    if let Some(slug) = field("boatSlug") {
        lines.push(format!("Slug: {slug}"));
    }
    if let Some(name) = field("name") {
        lines.push(format!("Name: {name}"));
    }
    if let Some(phone) = field("phone") {
        lines.push(format!("Phone: {phone}"));
    }
    if let Some(email) = field("email") {
        lines.push(format!("Email: {email}"));
    }
    if let Some(from) = field("dateFrom") {
        lines.push(format!("From: {from}"));
    }
    if let Some(until) = field("dateTo") {
        lines.push(format!("To: {until}"));
    }
    if let Some(people) = data.get("peopleCount").filter(|v| !v.is_null()) {
        lines.push(format!("People: {people}"));
    }
    if let Some(skipper) = data.get("needSkipper").and_then(Value::as_bool) {
        lines.push(format!(
            "Skipper: {}",
            if skipper { "yes" } else { "no" }
        ));
    }
    if let Some(message) = field("message") {
        lines.push(format!("Message: {message}"));
    }

    Some(format!(
        "mailto:{to}?subject={}&body={}",
        utf8_percent_encode(&subject, MAILTO_SET),
        utf8_percent_encode(&lines.join("\n"), MAILTO_SET)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers).as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn mailto_includes_known_fields_and_encodes() {
        let body = json!({
            "boatTitle": "Sea Ray 240",
            "boatSlug": "sea-ray-240",
            "name": "Ana & Marko",
            "dateFrom": "2025-07-01",
        });
        let link = fallback_mailto("crew@example.com", &body).unwrap();
        assert!(link.starts_with("mailto:crew@example.com?subject=Boat%20request%3A%20Sea%20Ray%20240"));
        assert!(link.contains("Ana%20%26%20Marko"));
        assert!(link.contains("sea-ray-240"));
        assert!(!link.contains("People"));
    }

    #[test]
    fn mailto_needs_a_recipient() {
        assert!(fallback_mailto("", &json!({"boatTitle": "x"})).is_none());
    }
}
