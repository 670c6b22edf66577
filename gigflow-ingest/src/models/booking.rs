//! Booking record
//!
//! One row per prospective or confirmed engagement. Enquiries created by the
//! webhook pipeline and manually entered bookings share this type.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Booking lifecycle status
///
/// Ordering follows the forward lifecycle; `Cancelled` sorts last but is not
/// reachable by forward progress, only by rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Enquiry,
    Negotiation,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Enquiry => "enquiry",
            BookingStatus::Negotiation => "negotiation",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// No lifecycle action may leave a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enquiry" => Ok(BookingStatus::Enquiry),
            "negotiation" => Ok(BookingStatus::Negotiation),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// How the booking's fields were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMethod {
    /// Entered by the musician
    Manual,
    /// Pattern extraction was sufficient
    Heuristic,
    /// Language-model fallback filled gaps
    AiAssisted,
    /// Fallback was needed but failed; heuristic fields only
    Degraded,
}

impl ParseMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseMethod::Manual => "manual",
            ParseMethod::Heuristic => "heuristic",
            ParseMethod::AiAssisted => "ai_assisted",
            ParseMethod::Degraded => "degraded",
        }
    }
}

impl FromStr for ParseMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ParseMethod::Manual),
            "heuristic" => Ok(ParseMethod::Heuristic),
            "ai_assisted" => Ok(ParseMethod::AiAssisted),
            "degraded" => Ok(ParseMethod::Degraded),
            other => Err(format!("unknown parse method: {}", other)),
        }
    }
}

/// Persisted booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub event_date: Option<NaiveDate>,
    #[serde(default, with = "hhmm_opt")]
    pub event_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm_opt")]
    pub event_end_time: Option<NaiveTime>,
    pub venue: Option<String>,
    pub venue_address: Option<String>,
    pub event_type: Option<String>,
    pub gig_type: Option<String>,
    pub estimated_value: Option<String>,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub response_needed: bool,
    pub parse_confidence: Option<f64>,
    pub parse_method: Option<ParseMethod>,
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a booking about to be inserted
///
/// Status is always `enquiry` at creation.
#[derive(Debug, Clone, Default)]
pub struct NewBooking {
    pub user_id: String,
    pub title: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub event_time: Option<NaiveTime>,
    pub event_end_time: Option<NaiveTime>,
    pub venue: Option<String>,
    pub venue_address: Option<String>,
    pub event_type: Option<String>,
    pub gig_type: Option<String>,
    pub estimated_value: Option<String>,
    pub notes: Option<String>,
    pub response_needed: bool,
    pub parse_confidence: Option<f64>,
    pub parse_method: Option<ParseMethod>,
    pub source_message_id: Option<String>,
}

/// Partial edit of schedule, venue and client details
///
/// Status is deliberately absent: it only moves through lifecycle actions.
/// `Some(None)` clears a nullable field, `None` leaves it unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BookingUpdate {
    pub title: Option<String>,
    pub client_name: Option<String>,
    #[serde(default, with = "double_opt")]
    pub client_email: Option<Option<String>>,
    #[serde(default, with = "double_opt")]
    pub client_phone: Option<Option<String>>,
    #[serde(default, with = "double_opt")]
    pub event_date: Option<Option<String>>,
    #[serde(default, with = "double_opt")]
    pub event_time: Option<Option<String>>,
    #[serde(default, with = "double_opt")]
    pub event_end_time: Option<Option<String>>,
    #[serde(default, with = "double_opt")]
    pub venue: Option<Option<String>>,
    #[serde(default, with = "double_opt")]
    pub venue_address: Option<Option<String>>,
    #[serde(default, with = "double_opt")]
    pub event_type: Option<Option<String>>,
    #[serde(default, with = "double_opt")]
    pub gig_type: Option<Option<String>>,
    #[serde(default, with = "double_opt")]
    pub estimated_value: Option<Option<String>>,
    #[serde(default, with = "double_opt")]
    pub notes: Option<Option<String>>,
}

/// Parse a stored or user-supplied `YYYY-MM-DD` date, discarding invalid text
pub fn parse_date_lenient(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Parse `HH:MM` or `HH:MM:SS`, discarding invalid text
pub fn parse_time_lenient(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Serialize optional times as `HH:MM`
mod hhmm_opt {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_some(&super::format_time(*t)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw.as_deref().and_then(super::parse_time_lenient))
    }
}

/// Distinguish "absent" from "explicit null" in PATCH bodies
mod double_opt {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(d).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            BookingStatus::Enquiry,
            BookingStatus::Negotiation,
            BookingStatus::Confirmed,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("pending".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
    }

    #[test]
    fn test_invalid_dates_are_discarded() {
        assert_eq!(
            parse_date_lenient("2025-09-20"),
            NaiveDate::from_ymd_opt(2025, 9, 20)
        );
        assert_eq!(parse_date_lenient("2025-02-30"), None);
        assert_eq!(parse_date_lenient("next week"), None);
    }

    #[test]
    fn test_update_distinguishes_null_from_absent() {
        let update: BookingUpdate =
            serde_json::from_str(r#"{"venue": null, "eventTime": "19:30"}"#).unwrap();
        assert_eq!(update.venue, Some(None));
        assert_eq!(update.event_time, Some(Some("19:30".to_string())));
        assert_eq!(update.client_email, None);
    }

    #[test]
    fn test_update_rejects_status_field() {
        let result: Result<BookingUpdate, _> = serde_json::from_str(r#"{"status": "confirmed"}"#);
        assert!(result.is_err());
    }
}
