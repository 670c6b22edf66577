//! Enquiry materializer
//!
//! Turns refined extraction output into a booking row. Creation is an
//! idempotent upsert keyed by `(user_id, source_message_id)`: the storage
//! constraint decides the winner between concurrent deliveries and the loser
//! reads the winner's row back.

use chrono::NaiveDate;
use gigflow_common::{Error, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::ai_fallback::RefinedExtraction;
use super::normalizer::RawPayload;
use super::types::{CanonicalEnvelope, ExtractedFields};
use crate::db::{bookings, payloads, users};
use crate::models::{Booking, NewBooking};
use crate::utils::db_retry::{retry_once_on_transient, DEFAULT_BACKOFF_MS};

/// Client name stored when extraction found none
pub const UNKNOWN_CLIENT: &str = "Unknown client";

/// Longest excerpt of the original message kept in notes
const NOTES_EXCERPT_CHARS: usize = 2000;

/// Routing suffix of a recipient address
///
/// `leads+jazzcat@gigflow.app` → `jazzcat`; without a `+` suffix the whole
/// local part is the prefix. Display names and angle brackets are ignored.
pub fn routing_prefix(recipient: &str) -> Option<String> {
    let address = match (recipient.rfind('<'), recipient.rfind('>')) {
        (Some(open), Some(close)) if open < close => &recipient[open + 1..close],
        _ => recipient,
    };
    // Multiple recipients: the first one decides
    let address = address.split(',').next()?.trim();
    let (local, _domain) = address.rsplit_once('@')?;
    let prefix = match local.split_once('+') {
        Some((_, suffix)) => suffix,
        None => local,
    };
    let prefix = prefix.trim();
    (!prefix.is_empty()).then(|| prefix.to_ascii_lowercase())
}

/// Owning user for a recipient, falling back to the triage account
pub async fn resolve_owner(pool: &SqlitePool, recipient: Option<&str>, default_user_id: &str) -> Result<String> {
    let Some(prefix) = recipient.and_then(routing_prefix) else {
        debug!("No routable recipient, using default user");
        return Ok(default_user_id.to_string());
    };
    match users::find_by_routing_prefix(pool, &prefix).await? {
        Some(user) => Ok(user.id),
        None => {
            debug!(prefix = %prefix, "Unknown routing prefix, using default user");
            Ok(default_user_id.to_string())
        }
    }
}

/// Deduplication key for a delivery
///
/// The provider's Message-Id when present; otherwise a digest of the fields
/// that identify the message, so identical redeliveries still collide.
pub fn source_message_id(envelope: &CanonicalEnvelope) -> String {
    if let Some(id) = envelope.message_id.as_deref() {
        let id = id.trim().trim_start_matches('<').trim_end_matches('>').trim();
        if !id.is_empty() {
            return id.to_string();
        }
    }

    let mut hasher = Sha256::new();
    for part in [
        &envelope.from,
        &envelope.to,
        &envelope.subject,
        &envelope.text_body,
        &envelope.html_body,
    ] {
        hasher.update(part.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("sha256:{}", hex)
}

/// Title from the subject minus reply/forward prefixes, else from the fields
pub fn build_title(subject: Option<&str>, fields: &ExtractedFields) -> String {
    if let Some(subject) = subject {
        let mut title = subject.trim();
        loop {
            let lower = title.to_ascii_lowercase();
            let stripped = ["re:", "fw:", "fwd:"]
                .iter()
                .find(|p| lower.starts_with(*p))
                .map(|p| title[p.len()..].trim_start());
            match stripped {
                Some(rest) => title = rest,
                None => break,
            }
        }
        if !title.is_empty() {
            return title.to_string();
        }
    }

    let kind = fields
        .event_type
        .as_ref()
        .map(|f| capitalize_first(&f.value))
        .unwrap_or_else(|| "Booking".to_string());
    match &fields.client_name {
        Some(name) => format!("{} enquiry - {}", kind, name.value),
        None => format!("{} enquiry", kind),
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Notes: extracted summary, how it was parsed, then the original text
pub fn build_notes(refined: &RefinedExtraction, original: &str) -> String {
    let mut notes = String::new();
    if let Some(summary) = &refined.fields.summary {
        notes.push_str(summary.trim());
        notes.push_str("\n\n");
    }
    notes.push_str(&format!(
        "Parsed by {} (confidence {:.2})",
        refined.method.as_str(),
        refined.confidence
    ));
    if let Some(reason) = &refined.degraded_reason {
        notes.push_str(&format!("; fallback failed: {}", reason));
    }
    let missing = refined.fields.missing_critical();
    if !missing.is_empty() {
        notes.push_str(&format!("; missing: {}", missing.join(", ")));
    }

    let original = original.trim();
    if !original.is_empty() {
        notes.push_str("\n\n--- Original message ---\n");
        let excerpt: String = original.chars().take(NOTES_EXCERPT_CHARS).collect();
        notes.push_str(&excerpt);
        if original.chars().count() > NOTES_EXCERPT_CHARS {
            notes.push_str("\n[truncated]");
        }
    }
    notes
}

/// Row to insert for a delivery
pub fn build_new_booking(
    user_id: &str,
    source_message_id: &str,
    envelope: &CanonicalEnvelope,
    refined: &RefinedExtraction,
    original_body: &str,
) -> NewBooking {
    let f = &refined.fields;
    let value = |field: &Option<super::types::FieldValue<String>>| field.as_ref().map(|v| v.value.clone());

    NewBooking {
        user_id: user_id.to_string(),
        title: build_title(envelope.subject.as_deref(), f),
        client_name: value(&f.client_name).unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
        client_email: value(&f.client_email),
        client_phone: value(&f.client_phone),
        event_date: f.event_date.as_ref().map(|v| v.value),
        event_time: f.event_time.as_ref().map(|v| v.value),
        event_end_time: f.event_end_time.as_ref().map(|v| v.value),
        venue: value(&f.venue),
        venue_address: value(&f.venue_address),
        event_type: value(&f.event_type),
        gig_type: value(&f.gig_type),
        estimated_value: value(&f.estimated_value),
        notes: Some(build_notes(refined, original_body)),
        response_needed: refined.response_needed,
        parse_confidence: Some(refined.confidence),
        parse_method: Some(refined.method),
        source_message_id: Some(source_message_id.to_string()),
    }
}

/// Copy extracted values into fields that are still empty
///
/// Returns whether anything changed. Values a musician already entered or
/// edited are never overwritten.
pub fn fill_missing(booking: &mut Booking, refined: &RefinedExtraction) -> bool {
    fn fill<T: Clone>(slot: &mut Option<T>, value: Option<&T>) -> bool {
        match (slot.is_none(), value) {
            (true, Some(v)) => {
                *slot = Some(v.clone());
                true
            }
            _ => false,
        }
    }

    let f = &refined.fields;
    let mut changed = false;
    if booking.client_name == UNKNOWN_CLIENT {
        if let Some(name) = &f.client_name {
            booking.client_name = name.value.clone();
            changed = true;
        }
    }
    changed |= fill(&mut booking.client_email, f.client_email.as_ref().map(|v| &v.value));
    changed |= fill(&mut booking.client_phone, f.client_phone.as_ref().map(|v| &v.value));
    changed |= fill(&mut booking.event_date, f.event_date.as_ref().map(|v| &v.value));
    changed |= fill(&mut booking.event_time, f.event_time.as_ref().map(|v| &v.value));
    changed |= fill(&mut booking.event_end_time, f.event_end_time.as_ref().map(|v| &v.value));
    changed |= fill(&mut booking.venue, f.venue.as_ref().map(|v| &v.value));
    changed |= fill(&mut booking.venue_address, f.venue_address.as_ref().map(|v| &v.value));
    changed |= fill(&mut booking.event_type, f.event_type.as_ref().map(|v| &v.value));
    changed |= fill(&mut booking.gig_type, f.gig_type.as_ref().map(|v| &v.value));
    changed |= fill(&mut booking.estimated_value, f.estimated_value.as_ref().map(|v| &v.value));
    changed
}

/// Result of materializing one delivery
#[derive(Debug, Clone)]
pub struct Materialized {
    pub booking: Booking,
    /// False when an earlier or concurrent delivery already created the row
    pub created: bool,
}

/// Store the raw payload and the booking in one transaction
///
/// Returns the winning row whether or not this call inserted it.
pub async fn materialize(
    pool: &SqlitePool,
    booking: &NewBooking,
    reference_date: NaiveDate,
    payload: &RawPayload,
) -> Result<Materialized> {
    let source_message_id = booking
        .source_message_id
        .clone()
        .ok_or_else(|| Error::InvalidInput("Webhook booking requires a source message id".to_string()))?;

    let message_id = source_message_id.as_str();
    retry_once_on_transient("materialize enquiry", DEFAULT_BACKOFF_MS, || async move {
        let mut tx = pool.begin().await?;

        payloads::insert_payload_if_absent(
            &mut *tx,
            &booking.user_id,
            message_id,
            reference_date,
            payload,
        )
        .await?;

        let inserted = bookings::insert_booking_if_absent(&mut *tx, booking).await?;
        let stored = bookings::find_by_source_message(&mut *tx, &booking.user_id, message_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Booking for {} vanished after upsert", message_id)))?;

        tx.commit().await?;

        if inserted.is_some() {
            info!(booking_id = %stored.id, user_id = %stored.user_id, "Created booking from enquiry");
        } else {
            info!(booking_id = %stored.id, user_id = %stored.user_id, "Enquiry already materialized, returning existing booking");
        }

        Ok(Materialized {
            created: inserted.is_some(),
            booking: stored,
        })
    })
    .await
}
