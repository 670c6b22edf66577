//! Heuristic extractor
//!
//! Pattern-based extraction of booking fields from a canonical envelope. Fast,
//! deterministic and offline; its confidence score gates the AI fallback.

use chrono::NaiveDate;
use tracing::debug;

use super::dates::{find_event_date, find_time, find_time_range};
use super::forwarded::unwrap_forwarded;
use super::patterns::{
    html_to_text, labelled_values, lookup, match_keyword, notification_template, LabelSet,
    DIRECT_LABELS, EVENT_TYPES, GENERIC_LOCAL_PARTS, GIG_TYPES, NOT_VENUES, RE_BUDGET_RANGE,
    RE_BUDGET_SINGLE, RE_DISPLAY_NAME, RE_EMAIL, RE_PHONE, RE_SELF_INTRO, RE_SIGN_OFF,
    RE_VENUE_AT,
};
use super::types::{
    CanonicalEnvelope, ExtractedFields, FieldValue, HeuristicResult, Precision, Provenance,
};

/// Trailing words `at <Venue>` may drag along
const VENUE_TRAILERS: &[&str] = &["on", "the", "of", "and", "&"];

/// Pattern extractor over canonical envelopes
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract booking fields, resolving relative dates against `reference_date`
    pub fn extract(&self, envelope: &CanonicalEnvelope, reference_date: NaiveDate) -> HeuristicResult {
        let raw_body = match (&envelope.text_body, &envelope.html_body) {
            (Some(text), _) => text.clone(),
            (None, Some(html)) => html_to_text(html),
            (None, None) => String::new(),
        };

        let unwrapped = unwrap_forwarded(&raw_body);
        if unwrapped.forwarded {
            debug!(
                original_from = ?unwrapped.original_from,
                "Unwrapped forwarded message"
            );
        }

        let sender = unwrapped
            .original_from
            .as_deref()
            .or(envelope.from.as_deref());
        let subject = unwrapped
            .original_subject
            .as_deref()
            .or(envelope.subject.as_deref())
            .unwrap_or("");
        let body = unwrapped.body.as_str();

        let template = notification_template(sender, body);
        let (provenance, labels) = match template {
            Some(t) => (Provenance::Notification(t.name.to_string()), t.labels),
            None => (Provenance::Direct, DIRECT_LABELS),
        };
        debug!(provenance = ?provenance, "Selected extraction template");

        let fields = match provenance {
            Provenance::Direct => extract_direct(sender, subject, body, &labels, reference_date),
            Provenance::Notification(_) => {
                extract_notification(subject, body, &labels, reference_date)
            }
        };

        let confidence = fields.confidence();
        debug!(
            confidence,
            missing = ?fields.missing_critical(),
            "Heuristic extraction finished"
        );

        HeuristicResult {
            fields,
            confidence,
            provenance,
            cleaned_body: unwrapped.body,
        }
    }
}

fn extract_direct(
    sender: Option<&str>,
    subject: &str,
    body: &str,
    labels: &LabelSet,
    today: NaiveDate,
) -> ExtractedFields {
    let values = labelled_values(body);

    let sender_email = sender
        .and_then(|s| RE_EMAIL.find(s))
        .map(|m| m.as_str().to_ascii_lowercase());

    let client_email = sender_email
        .clone()
        .map(|e| FieldValue::high(e, "from_header"))
        .or_else(|| label_email(&values, labels))
        .or_else(|| {
            RE_EMAIL
                .find(body)
                .map(|m| FieldValue::fallback(m.as_str().to_ascii_lowercase(), "body_email"))
        });

    let client_name = sender
        .and_then(display_name)
        .map(|n| FieldValue::high(n, "display_name"))
        .or_else(|| lookup(&values, labels.client_name).map(|n| FieldValue::high(clean_name(n), "label")))
        .or_else(|| {
            sender_email
                .as_deref()
                .and_then(name_from_local_part)
                .map(|n| FieldValue::fallback(n, "local_part"))
        })
        .or_else(|| body_name(body));

    let mut fields = common_fields(subject, body, &values, labels, today);
    fields.client_email = client_email;
    fields.client_name = client_name;
    fields
}

fn extract_notification(
    subject: &str,
    body: &str,
    labels: &LabelSet,
    today: NaiveDate,
) -> ExtractedFields {
    let values = labelled_values(body);

    // The envelope sender is the marketplace; the client only appears in the body
    let client_email = label_email(&values, labels);
    let client_name = lookup(&values, labels.client_name)
        .map(|n| FieldValue::high(clean_name(n), "template_label"))
        .or_else(|| body_name(body));

    let mut fields = common_fields(subject, body, &values, labels, today);
    fields.client_email = client_email;
    fields.client_name = client_name;
    fields
}

/// Fields extracted the same way for every provenance
fn common_fields(
    subject: &str,
    body: &str,
    values: &std::collections::HashMap<String, String>,
    labels: &LabelSet,
    today: NaiveDate,
) -> ExtractedFields {
    let mut fields = ExtractedFields::default();

    fields.client_phone = lookup(values, labels.phone)
        .map(|p| FieldValue::high(p.to_string(), "label"))
        .or_else(|| body_phone(body).map(|p| FieldValue::fallback(p, "body_phone")));

    fields.event_date = lookup(values, labels.date)
        .and_then(|v| find_event_date(v, today))
        .map(|m| FieldValue {
            value: m.date,
            precision: m.precision,
            source: "label".to_string(),
        })
        .or_else(|| {
            find_event_date(body, today)
                .or_else(|| find_event_date(subject, today))
                .map(|m| FieldValue {
                    value: m.date,
                    precision: m.precision,
                    source: "body_date".to_string(),
                })
        });
    if let Some(date) = &fields.event_date {
        debug!(date = %date.value, source = %date.source, "Matched event date");
    }

    let time_text = lookup(values, labels.time);
    let range = time_text
        .and_then(find_time_range)
        .or_else(|| find_time_range(body));
    match range {
        Some((start, end)) => {
            fields.event_time = Some(FieldValue::high(start, "time_range"));
            fields.event_end_time = Some(FieldValue::high(end, "time_range"));
        }
        None => {
            fields.event_time = time_text
                .and_then(find_time)
                .or_else(|| find_time(body))
                .map(|t| FieldValue::high(t, "clock_time"));
        }
    }

    let location = lookup(values, labels.location).map(str::to_string);
    fields.venue = lookup(values, labels.venue)
        .map(|v| FieldValue::high(v.to_string(), "label"))
        .or_else(|| venue_from_text(body).map(|v| FieldValue::high(v, "at_phrase")))
        .or_else(|| {
            // Marketplace "Location: Venue, Town" lines name the venue first
            location
                .as_deref()
                .and_then(|l| l.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| FieldValue::fallback(v.to_string(), "location_label"))
        });
    fields.venue_address = location.map(|l| FieldValue::high(l, "label"));

    fields.estimated_value = lookup(values, labels.budget)
        .and_then(budget_from_text)
        .or_else(|| budget_from_text(body));

    let haystack = format!("{}\n{}", subject, body).to_lowercase();
    fields.event_type = lookup(values, labels.event_type)
        .map(|v| {
            let lower = v.to_lowercase();
            match_keyword(&lower, EVENT_TYPES).map_or_else(|| lower.clone(), str::to_string)
        })
        .or_else(|| match_keyword(&haystack, EVENT_TYPES).map(str::to_string))
        .map(|v| FieldValue::high(v, "keyword"));
    fields.gig_type = lookup(values, labels.gig_type)
        .map(|v| {
            let lower = v.to_lowercase();
            match_keyword(&lower, GIG_TYPES).map_or_else(|| lower.clone(), str::to_string)
        })
        .or_else(|| match_keyword(&haystack, GIG_TYPES).map(str::to_string))
        .map(|v| FieldValue::high(v, "keyword"));

    fields
}

fn label_email(
    values: &std::collections::HashMap<String, String>,
    labels: &LabelSet,
) -> Option<FieldValue<String>> {
    lookup(values, labels.email)
        .and_then(|v| RE_EMAIL.find(v))
        .map(|m| FieldValue::high(m.as_str().to_ascii_lowercase(), "label"))
}

/// Display name before `<address>`, unless it is just the address again
pub fn display_name(sender: &str) -> Option<String> {
    let caps = RE_DISPLAY_NAME.captures(sender)?;
    let name = caps[1].trim().trim_matches(|c| c == '\'' || c == '"').trim();
    if name.is_empty() || name.contains('@') {
        return None;
    }
    Some(clean_name(name))
}

/// `jane.doe_smith@x` → `Jane Doe Smith`; generic mailboxes yield nothing
pub fn name_from_local_part(email: &str) -> Option<String> {
    let local = email.split('@').next()?.split('+').next()?;
    if GENERIC_LOCAL_PARTS.contains(&local.to_ascii_lowercase().as_str()) {
        return None;
    }
    let words: Vec<String> = local
        .split(['.', '_', '-'])
        .filter(|w| !w.is_empty() && w.chars().all(char::is_alphabetic))
        .map(capitalize)
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Title-case all-lowercase or all-uppercase names, leave mixed case alone
fn clean_name(raw: &str) -> String {
    let trimmed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let has_lower = trimmed.chars().any(char::is_lowercase);
    let has_upper = trimmed.chars().any(char::is_uppercase);
    if has_lower && has_upper {
        trimmed
    } else {
        trimmed.split(' ').map(capitalize).collect::<Vec<_>>().join(" ")
    }
}

fn body_name(body: &str) -> Option<FieldValue<String>> {
    if let Some(caps) = RE_SELF_INTRO.captures(body) {
        return Some(FieldValue::high(caps[1].trim().to_string(), "self_intro"));
    }
    RE_SIGN_OFF
        .captures(body)
        .map(|caps| FieldValue::fallback(caps[1].trim().to_string(), "sign_off"))
}

/// First phone-shaped run that has a plausible digit count
fn body_phone(body: &str) -> Option<String> {
    RE_PHONE.find_iter(body).find_map(|m| {
        let raw = m.as_str().trim();
        let digits = raw.chars().filter(char::is_ascii_digit).count();
        let plausible_start = raw.starts_with('+') || raw.starts_with('0') || raw.starts_with('(');
        (plausible_start && (10..=15).contains(&digits)).then(|| raw.to_string())
    })
}

fn venue_from_text(body: &str) -> Option<String> {
    RE_VENUE_AT.captures_iter(body).find_map(|caps| {
        let mut words: Vec<&str> = caps[1].split_whitespace().collect();
        while words
            .last()
            .is_some_and(|w| VENUE_TRAILERS.contains(&w.to_ascii_lowercase().as_str()))
        {
            words.pop();
        }
        let venue = words.join(" ");
        let bare = venue.trim_start_matches("the ").trim_start_matches("The ");
        if venue.is_empty() || NOT_VENUES.iter().any(|n| n.eq_ignore_ascii_case(bare) || n.eq_ignore_ascii_case(&venue)) {
            None
        } else {
            Some(venue)
        }
    })
}

/// Budget text such as `£300–£500` or `£400`, normalized
fn budget_from_text(text: &str) -> Option<FieldValue<String>> {
    if let Some(caps) = RE_BUDGET_RANGE.captures(text) {
        let symbol = &caps[1];
        let value = format!("{}{}-{}{}", symbol, &caps[2], symbol, &caps[3]);
        return Some(FieldValue::high(value, "budget_range"));
    }
    let caps = RE_BUDGET_SINGLE.captures(text)?;
    if let (Some(symbol), Some(amount)) = (caps.get(1), caps.get(2)) {
        return Some(FieldValue::high(
            format!("{}{}", symbol.as_str(), amount.as_str()),
            "budget_amount",
        ));
    }
    let amount = caps.get(3)?.as_str();
    let unit = caps.get(4)?.as_str().to_ascii_lowercase();
    let symbol = match unit.as_str() {
        "gbp" | "pounds" => "£",
        "usd" | "dollars" => "$",
        _ => "€",
    };
    Some(FieldValue::fallback(format!("{}{}", symbol, amount), "budget_words"))
}
