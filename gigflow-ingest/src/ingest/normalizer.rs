//! Field normalizer
//!
//! Maps provider-specific webhook field names onto [`CanonicalEnvelope`].
//! Each canonical field has an ordered alias list; the first alias with a
//! non-empty value wins. Lookups are case-insensitive. Besides top-level form
//! fields an alias may point into a serialized header list (`message-headers`
//! JSON pairs or a raw `headers` block) or a JSON `envelope` object.
//!
//! Normalization never fails: unknown keys are ignored and absent fields stay
//! `None`.

use super::types::CanonicalEnvelope;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Decoded webhook body: ordered key → values pairs
///
/// Keys keep their original spelling; repeated keys accumulate values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    fields: Vec<(String, Vec<String>)>,
}

impl RawPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.fields.push((key, vec![value])),
        }
    }

    /// Builder-style [`push`](Self::push)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// First non-blank value for `key`, compared case-insensitively
    pub fn first_value(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .flat_map(|(_, values)| values.iter())
            .map(|v| v.as_str())
            .find(|v| !v.trim().is_empty())
    }
}

/// One place a canonical field may be found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alias {
    /// Top-level payload field
    Field(&'static str),
    /// Header inside `message-headers` / `headers`
    Header(&'static str),
    /// Key inside a JSON `envelope` field
    Envelope(&'static str),
}

impl Alias {
    fn label(self) -> String {
        match self {
            Alias::Field(name) => name.to_string(),
            Alias::Header(name) => format!("header:{}", name),
            Alias::Envelope(name) => format!("envelope:{}", name),
        }
    }
}

const FROM_ALIASES: &[Alias] = &[
    Alias::Field("sender"),
    Alias::Field("From"),
    Alias::Field("from"),
    Alias::Header("From"),
    Alias::Envelope("from"),
];

const TO_ALIASES: &[Alias] = &[
    Alias::Field("recipient"),
    Alias::Field("To"),
    Alias::Field("to"),
    Alias::Header("To"),
    Alias::Envelope("to"),
];

const SUBJECT_ALIASES: &[Alias] = &[
    Alias::Field("subject"),
    Alias::Field("Subject"),
    Alias::Header("Subject"),
];

const TEXT_ALIASES: &[Alias] = &[
    Alias::Field("body-plain"),
    Alias::Field("stripped-text"),
    Alias::Field("text"),
];

const HTML_ALIASES: &[Alias] = &[
    Alias::Field("body-html"),
    Alias::Field("stripped-html"),
    Alias::Field("html"),
];

const MESSAGE_ID_ALIASES: &[Alias] = &[
    Alias::Field("Message-Id"),
    Alias::Field("message_id"),
    Alias::Field("MessageID"),
    Alias::Header("Message-Id"),
];

const TIMESTAMP_ALIASES: &[Alias] = &[
    Alias::Field("timestamp"),
    Alias::Field("Date"),
    Alias::Header("Date"),
];

/// Which alias populated a canonical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasMatch {
    pub field: &'static str,
    pub alias: String,
}

/// Normalizer output: envelope plus alias diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedPayload {
    pub envelope: CanonicalEnvelope,
    pub matches: Vec<AliasMatch>,
}

/// Maps raw payloads to canonical envelopes
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldNormalizer;

impl FieldNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a raw payload
    pub fn normalize(&self, payload: &RawPayload) -> NormalizedPayload {
        let headers = parse_header_list(payload);
        let envelope_json = payload
            .first_value("envelope")
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok());

        let mut matches = Vec::new();
        let mut resolve = |field: &'static str, aliases: &[Alias]| -> Option<String> {
            for alias in aliases {
                let value = match *alias {
                    Alias::Field(name) => payload.first_value(name).map(str::to_string),
                    Alias::Header(name) => header_value(&headers, name),
                    Alias::Envelope(key) => envelope_json.as_ref().and_then(|v| envelope_value(v, key)),
                };
                if let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
                    debug!(field, alias = %alias.label(), "Canonical field resolved");
                    matches.push(AliasMatch {
                        field,
                        alias: alias.label(),
                    });
                    return Some(value);
                }
            }
            debug!(field, "Canonical field absent");
            None
        };

        let envelope = CanonicalEnvelope {
            from: resolve("from", FROM_ALIASES),
            to: resolve("to", TO_ALIASES),
            subject: resolve("subject", SUBJECT_ALIASES),
            text_body: resolve("textBody", TEXT_ALIASES),
            html_body: resolve("htmlBody", HTML_ALIASES),
            message_id: resolve("messageId", MESSAGE_ID_ALIASES),
            timestamp: resolve("timestamp", TIMESTAMP_ALIASES),
        };

        NormalizedPayload { envelope, matches }
    }
}

/// Collect headers from `message-headers` (JSON pairs) or `headers` (raw block)
fn parse_header_list(payload: &RawPayload) -> Vec<(String, String)> {
    if let Some(raw) = payload.first_value("message-headers") {
        if let Ok(pairs) = serde_json::from_str::<Vec<(String, String)>>(raw) {
            return pairs;
        }
        debug!("message-headers present but not a JSON pair list");
    }

    match payload.first_value("headers") {
        Some(raw) => parse_raw_headers(raw),
        None => Vec::new(),
    }
}

/// Parse an RFC 5322 header block, unfolding continuation lines
pub fn parse_raw_headers(raw: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in raw.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if !name.is_empty() && !name.contains(' ') {
                headers.push((name.to_string(), value.trim().to_string()));
            }
        }
    }
    headers
}

fn header_value(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, v)| k.eq_ignore_ascii_case(name) && !v.trim().is_empty())
        .map(|(_, v)| v.clone())
}

/// Envelope values may be a string or a list of strings
fn envelope_value(envelope: &serde_json::Value, key: &str) -> Option<String> {
    let object = envelope.as_object()?;
    let value = object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)?;
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .find(|s| !s.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias_for<'a>(normalized: &'a NormalizedPayload, field: &str) -> Option<&'a str> {
        normalized
            .matches
            .iter()
            .find(|m| m.field == field)
            .map(|m| m.alias.as_str())
    }

    #[test]
    fn test_each_documented_alias_populates_its_field() {
        let cases: &[(&str, &str)] = &[
            ("sender", "from"),
            ("From", "from"),
            ("from", "from"),
            ("recipient", "to"),
            ("To", "to"),
            ("to", "to"),
            ("subject", "subject"),
            ("Subject", "subject"),
            ("body-plain", "textBody"),
            ("stripped-text", "textBody"),
            ("text", "textBody"),
            ("body-html", "htmlBody"),
            ("stripped-html", "htmlBody"),
            ("html", "htmlBody"),
        ];

        for (key, field) in cases {
            let payload = RawPayload::new().with(*key, "value");
            let normalized = FieldNormalizer::new().normalize(&payload);
            let env = &normalized.envelope;
            let value = match *field {
                "from" => &env.from,
                "to" => &env.to,
                "subject" => &env.subject,
                "textBody" => &env.text_body,
                "htmlBody" => &env.html_body,
                _ => unreachable!(),
            };
            assert_eq!(value.as_deref(), Some("value"), "alias {} → {}", key, field);
            assert!(alias_for(&normalized, field).is_some());
        }
    }

    #[test]
    fn test_aliases_are_case_insensitive() {
        let payload = RawPayload::new()
            .with("SENDER", "a@example.com")
            .with("Body-Plain", "hello");
        let env = FieldNormalizer::new().normalize(&payload).envelope;
        assert_eq!(env.from.as_deref(), Some("a@example.com"));
        assert_eq!(env.text_body.as_deref(), Some("hello"));
    }

    #[test]
    fn test_first_non_empty_alias_wins() {
        let payload = RawPayload::new()
            .with("sender", "   ")
            .with("from", "Jane <jane@example.com>");
        let normalized = FieldNormalizer::new().normalize(&payload);
        assert_eq!(normalized.envelope.from.as_deref(), Some("Jane <jane@example.com>"));
        assert_eq!(alias_for(&normalized, "from"), Some("From"));
    }

    #[test]
    fn test_array_values_use_first_non_empty() {
        let payload = RawPayload::new()
            .with("recipient", "")
            .with("recipient", "leads+abc@gigflow.test");
        let env = FieldNormalizer::new().normalize(&payload).envelope;
        assert_eq!(env.to.as_deref(), Some("leads+abc@gigflow.test"));
    }

    #[test]
    fn test_from_falls_back_to_json_header_list() {
        let headers = r#"[["Received","x"],["From","Bob <bob@example.com>"],["Message-Id","<m1@mail>"]]"#;
        let payload = RawPayload::new().with("message-headers", headers);
        let normalized = FieldNormalizer::new().normalize(&payload);
        assert_eq!(normalized.envelope.from.as_deref(), Some("Bob <bob@example.com>"));
        assert_eq!(normalized.envelope.message_id.as_deref(), Some("<m1@mail>"));
        assert_eq!(alias_for(&normalized, "from"), Some("header:From"));
    }

    #[test]
    fn test_raw_header_block_with_folding() {
        let headers = "From: Carol\r\n <carol@example.com>\r\nSubject: Gig\r\nDate: Wed, 16 Jul 2025 09:30:00 +0000\r\n";
        let payload = RawPayload::new().with("headers", headers);
        let env = FieldNormalizer::new().normalize(&payload).envelope;
        assert_eq!(env.from.as_deref(), Some("Carol <carol@example.com>"));
        assert_eq!(env.subject.as_deref(), Some("Gig"));
        assert_eq!(env.timestamp.as_deref(), Some("Wed, 16 Jul 2025 09:30:00 +0000"));
    }

    #[test]
    fn test_envelope_json_supplies_recipient() {
        let payload = RawPayload::new()
            .with("envelope", r#"{"to":["leads+xyz@gigflow.test"],"from":"d@example.com"}"#);
        let env = FieldNormalizer::new().normalize(&payload).envelope;
        assert_eq!(env.to.as_deref(), Some("leads+xyz@gigflow.test"));
        assert_eq!(env.from.as_deref(), Some("d@example.com"));
    }

    #[test]
    fn test_unknown_and_missing_keys_resolve_to_none() {
        let payload = RawPayload::new()
            .with("attachment-count", "0")
            .with("message-headers", "not json");
        let normalized = FieldNormalizer::new().normalize(&payload);
        assert_eq!(normalized.envelope, CanonicalEnvelope::default());
        assert!(normalized.matches.is_empty());
    }
}
