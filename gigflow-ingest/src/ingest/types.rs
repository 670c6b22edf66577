//! Shared types between ingestion stages
//!
//! Normalizer → heuristic extractor → AI fallback → materializer. Each stage
//! consumes the previous stage's output type from this module.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Canonical email envelope, independent of provider field naming
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEnvelope {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<String>,
}

impl CanonicalEnvelope {
    /// True when there is nothing to extract from
    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.text_body.is_none() && self.html_body.is_none()
    }
}

/// How much a matched value can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Matched by a specific, labelled or structured pattern
    High,
    /// Supplied by the language-model fallback
    Model,
    /// Best-effort guess (e.g. name derived from an email local part)
    Fallback,
}

impl Precision {
    /// Contribution of a field with this precision to the confidence score
    pub fn weight(self) -> f64 {
        match self {
            Precision::High => 1.0,
            Precision::Model => 0.8,
            Precision::Fallback => 0.0,
        }
    }
}

/// One extracted value with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue<T> {
    pub value: T,
    pub precision: Precision,
    /// Pattern or stage that produced the value
    pub source: String,
}

impl<T> FieldValue<T> {
    pub fn high(value: T, source: impl Into<String>) -> Self {
        Self {
            value,
            precision: Precision::High,
            source: source.into(),
        }
    }

    pub fn fallback(value: T, source: impl Into<String>) -> Self {
        Self {
            value,
            precision: Precision::Fallback,
            source: source.into(),
        }
    }

    pub fn model(value: T) -> Self {
        Self {
            value,
            precision: Precision::Model,
            source: "ai".to_string(),
        }
    }
}

/// Partial booking fields produced by extraction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub client_name: Option<FieldValue<String>>,
    pub client_email: Option<FieldValue<String>>,
    pub client_phone: Option<FieldValue<String>>,
    pub event_date: Option<FieldValue<NaiveDate>>,
    pub event_time: Option<FieldValue<NaiveTime>>,
    pub event_end_time: Option<FieldValue<NaiveTime>>,
    pub venue: Option<FieldValue<String>>,
    pub venue_address: Option<FieldValue<String>>,
    pub event_type: Option<FieldValue<String>>,
    pub gig_type: Option<FieldValue<String>>,
    pub estimated_value: Option<FieldValue<String>>,
    pub summary: Option<String>,
}

/// Weights of the fields that make up extraction confidence (sum to 1.0)
pub const CONFIDENCE_WEIGHTS: [(&str, f64); 6] = [
    ("client_name", 0.20),
    ("client_email", 0.15),
    ("event_date", 0.30),
    ("event_time", 0.10),
    ("venue", 0.15),
    ("estimated_value", 0.10),
];

impl ExtractedFields {
    fn weighted_precision(&self, field: &str) -> f64 {
        let precision = match field {
            "client_name" => self.client_name.as_ref().map(|f| f.precision),
            "client_email" => self.client_email.as_ref().map(|f| f.precision),
            "event_date" => self.event_date.as_ref().map(|f| f.precision),
            "event_time" => self.event_time.as_ref().map(|f| f.precision),
            "venue" => self.venue.as_ref().map(|f| f.precision),
            "estimated_value" => self.estimated_value.as_ref().map(|f| f.precision),
            _ => None,
        };
        precision.map(Precision::weight).unwrap_or(0.0)
    }

    /// Weighted fraction of expected fields matched with trusted precision
    pub fn confidence(&self) -> f64 {
        let score: f64 = CONFIDENCE_WEIGHTS
            .iter()
            .map(|(field, weight)| weight * self.weighted_precision(field))
            .sum();
        score.clamp(0.0, 1.0)
    }

    /// Fields without which a booking cannot be acted on
    pub fn missing_critical(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.event_date.is_none() {
            missing.push("event_date");
        }
        if self.client_name.is_none() {
            missing.push("client_name");
        }
        missing
    }
}

/// Where a message came from, which decides the extraction template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "template", rename_all = "snake_case")]
pub enum Provenance {
    /// Written by the client (possibly forwarded)
    Direct,
    /// Automated notification from a gig marketplace / job board
    Notification(String),
}

/// Output of the heuristic extractor
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicResult {
    pub fields: ExtractedFields,
    pub confidence: f64,
    pub provenance: Provenance,
    /// Body text the patterns ran against (forwarding wrappers removed)
    pub cleaned_body: String,
}
