//! Inbound email webhook
//!
//! POST /webhook/email accepts URL-encoded, multipart or JSON bodies from mail
//! providers. Every decodable delivery gets `200 {success, enquiryId?, error?}`
//! so providers never retry on our account; only unsupported content types are
//! rejected outright.

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::activity::ActivityEntry;
use crate::ingest::RawPayload;
use crate::AppState;

/// Upper bound on a buffered webhook body
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Why a webhook body could not be turned into a [`RawPayload`]
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("unreadable request body: {0}")]
    Body(String),

    #[error("malformed form body: {0}")]
    Form(String),

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("malformed JSON body: {0}")]
    Json(String),
}

/// Webhook response body
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enquiry_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            enquiry_id: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BodyKind {
    Form,
    Multipart,
    Json,
}

fn body_kind(content_type: &str) -> Option<BodyKind> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "application/x-www-form-urlencoded" => Some(BodyKind::Form),
        "multipart/form-data" => Some(BodyKind::Multipart),
        "application/json" => Some(BodyKind::Json),
        _ => None,
    }
}

/// Decode a URL-encoded body
pub fn decode_form(bytes: &[u8]) -> Result<RawPayload, DecodeError> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(bytes).map_err(|e| DecodeError::Form(e.to_string()))?;
    let mut payload = RawPayload::new();
    for (key, value) in pairs {
        payload.push(key, value);
    }
    Ok(payload)
}

/// Decode a JSON object body
///
/// Arrays of strings become repeated values, like repeated form keys. Other
/// non-string values (header pair lists, envelope objects) are kept as their
/// JSON text for the normalizer to interpret.
pub fn decode_json(bytes: &[u8]) -> Result<RawPayload, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Json(e.to_string()))?;
    let serde_json::Value::Object(map) = value else {
        return Err(DecodeError::Json("expected a JSON object".to_string()));
    };

    let mut payload = RawPayload::new();
    for (key, value) in map {
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::String(s) => payload.push(key, s),
            serde_json::Value::Array(items) if items.iter().all(|v| v.is_string()) => {
                for item in items {
                    if let serde_json::Value::String(s) = item {
                        payload.push(key.clone(), s);
                    }
                }
            }
            other => payload.push(key, other.to_string()),
        }
    }
    Ok(payload)
}

async fn decode_multipart(mut multipart: Multipart) -> Result<RawPayload, DecodeError> {
    let mut payload = RawPayload::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DecodeError::Multipart(e.to_string()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        // Attachments are not part of the enquiry text
        if field.file_name().is_some() {
            debug!(field = %name, "Skipping multipart attachment");
            continue;
        }
        let value = field
            .text()
            .await
            .map_err(|e| DecodeError::Multipart(e.to_string()))?;
        payload.push(name, value);
    }
    Ok(payload)
}

async fn decode_request(request: Request) -> Result<RawPayload, DecodeError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let kind = body_kind(&content_type)
        .ok_or_else(|| DecodeError::UnsupportedContentType(content_type.clone()))?;

    match kind {
        BodyKind::Multipart => {
            let multipart = Multipart::from_request(request, &())
                .await
                .map_err(|e| DecodeError::Multipart(e.to_string()))?;
            decode_multipart(multipart).await
        }
        BodyKind::Form | BodyKind::Json => {
            let bytes = to_bytes(request.into_body(), MAX_BODY_BYTES)
                .await
                .map_err(|e| DecodeError::Body(e.to_string()))?;
            match kind {
                BodyKind::Form => decode_form(&bytes),
                _ => decode_json(&bytes),
            }
        }
    }
}

/// POST /webhook/email
pub async fn receive_email(State(state): State<AppState>, request: Request<Body>) -> Response {
    let payload = match decode_request(request).await {
        Ok(payload) => payload,
        Err(DecodeError::UnsupportedContentType(ct)) => {
            warn!(content_type = %ct, "Rejecting webhook with unsupported content type");
            let body = WebhookResponse::failure(format!("unsupported content type: {}", ct));
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
        Err(e) => {
            warn!(error = %e, "Webhook body could not be decoded");
            let mut entry = ActivityEntry::new(crate::activity::DeliveryOutcome::Rejected);
            entry.error = Some(e.to_string());
            state.activity.record(entry).await;
            return Json(WebhookResponse::failure(e.to_string())).into_response();
        }
    };

    debug!(fields = ?payload.keys().collect::<Vec<_>>(), "Decoded webhook payload");
    let outcome = state
        .pipeline
        .ingest(payload, Utc::now().date_naive())
        .await;

    if let Some(booking) = &outcome.booking {
        info!(
            booking_id = %booking.id,
            created = outcome.created,
            needs_review = booking.response_needed,
            "Webhook delivery processed"
        );
    }

    Json(WebhookResponse {
        success: outcome.success(),
        enquiry_id: outcome.booking.as_ref().map(|b| b.id.to_string()),
        error: outcome.error,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// GET /webhook/activity
pub async fn recent_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Json<Vec<ActivityEntry>> {
    let limit = query.limit.unwrap_or(50);
    Json(state.activity.recent(limit).await)
}

/// Build webhook routes
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/webhook/email", post(receive_email))
        .route("/webhook/activity", get(recent_activity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_decoding_keeps_repeated_keys() {
        let payload = decode_form(b"sender=a%40b.com&To=x%40y.com&To=z%40y.com").unwrap();
        assert_eq!(payload.first_value("sender"), Some("a@b.com"));
        assert_eq!(payload.first_value("to"), Some("x@y.com"));
    }

    #[test]
    fn test_json_objects_are_kept_as_text() {
        let payload =
            decode_json(br#"{"from":"a@b.com","envelope":{"to":["x@y.com"]},"spam":null}"#).unwrap();
        assert_eq!(payload.first_value("from"), Some("a@b.com"));
        assert_eq!(payload.first_value("envelope"), Some(r#"{"to":["x@y.com"]}"#));
        assert_eq!(payload.first_value("spam"), None);
    }

    #[test]
    fn test_json_string_arrays_become_repeated_values() {
        let payload = decode_json(
            br#"{"from":["Jane Doe <jane@example.com>"],"to":["leads+sam@x.com","cc@x.com"],
                "message-headers":[["From","Jane Doe <jane@example.com>"]]}"#,
        )
        .unwrap();
        assert_eq!(payload.first_value("from"), Some("Jane Doe <jane@example.com>"));
        assert_eq!(payload.first_value("to"), Some("leads+sam@x.com"));
        assert_eq!(
            payload.first_value("message-headers"),
            Some(r#"[["From","Jane Doe <jane@example.com>"]]"#)
        );
    }

    #[test]
    fn test_json_must_be_an_object() {
        assert!(matches!(decode_json(b"[1,2]"), Err(DecodeError::Json(_))));
        assert!(matches!(decode_json(b"{not json"), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_content_type_parameters_ignored() {
        assert!(matches!(
            body_kind("multipart/form-data; boundary=xyz"),
            Some(BodyKind::Multipart)
        ));
        assert!(body_kind("text/plain").is_none());
    }
}
