//! Pattern dictionaries used by the heuristic extractor
//!
//! Generic patterns apply to every message. Notification templates apply only
//! to automated marketplace mail, selected by sender domain or body marker.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

pub static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+").unwrap()
});

/// `"Jane Doe" <jane@example.com>` or `Jane Doe <jane@example.com>`
pub static RE_DISPLAY_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*"?([^"<>]+?)"?\s*<[^>]+>"#).unwrap()
});

pub static RE_PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{2,5}\)[\s.-]?)?\d{3,5}[\s.-]?\d{3,4}[\s.-]?\d{0,4}").unwrap()
});

pub static RE_SELF_INTRO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?i:my name is|this is|i am|i'm)\s+([A-Z][a-z'’-]+(?:\s+[A-Z][a-z'’-]+){0,2})").unwrap()
});

/// Sign-off name on its own line after "Thanks," / "Best wishes," etc.
pub static RE_SIGN_OFF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?i:thanks|thank you|many thanks|best|best wishes|kind regards|regards|cheers)[,!.]?\s*\n\s*([A-Z][a-z'’-]+(?:\s+[A-Z][a-z'’-]+){0,2})\s*$").unwrap()
});

/// `£300–£500`, `£300 - 500`, `$1,200`, `500 GBP`
pub static RE_BUDGET_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([£$€])\s?(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)\s*(?:-|–|—|to)\s*[£$€]?\s?(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)").unwrap()
});

pub static RE_BUDGET_SINGLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:([£$€])\s?(\d{1,3}(?:,\d{3})*(?:\.\d{2})?|\d+(?:\.\d{2})?)|\b(\d+(?:\.\d{2})?)\s?(gbp|usd|eur|pounds|dollars)\b)").unwrap()
});

/// `at The Grand Hotel`, stopping before punctuation or a lowercase word
pub static RE_VENUE_AT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:at|venue is|held at|taking place at)\s+((?:the\s+|The\s+)?[A-Z][\w'’&-]*(?:\s+(?:[A-Z][\w'’&-]*|of|on|the|and|&))*)").unwrap()
});

/// `Label: value` lines
static RE_LABEL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[\s*>•-]*([A-Za-z][A-Za-z /()-]{0,30}?)\s*:\s*(\S.*?)\s*$").unwrap()
});

pub static RE_HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

pub static RE_HTML_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:script|style)[^>]*>.*?</(?:script|style)>").unwrap()
});

pub static RE_HTML_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*(?:br\s*/?|/p|/div|/tr|/li|/h\d)\s*>").unwrap()
});

/// Words that look like venue names in `at X` but are not
pub const NOT_VENUES: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday",
    "Saturday", "Sunday", "Christmas", "Easter", "Noon", "Midnight", "Least", "All", "Some",
    "Any", "The Moment", "The Weekend", "The End",
];

/// Local parts that never name a person
pub const GENERIC_LOCAL_PARTS: &[&str] = &[
    "info", "noreply", "no-reply", "donotreply", "do-not-reply", "hello", "contact", "admin",
    "bookings", "booking", "enquiries", "enquiry", "events", "mail", "notifications", "support",
    "team", "office", "sales", "leads", "alerts",
];

/// Event occasion keywords, most specific first
pub const EVENT_TYPES: &[(&str, &[&str])] = &[
    ("wedding", &["wedding", "reception", "ceremony", "bride", "groom", "nuptials"]),
    ("birthday", &["birthday", "bday", "b-day", "30th", "40th", "50th", "60th", "21st", "18th"]),
    ("anniversary", &["anniversary"]),
    ("corporate", &["corporate", "company", "conference", "awards", "launch", "office party"]),
    ("christmas party", &["christmas party", "xmas party", "festive party"]),
    ("funeral", &["funeral", "memorial", "wake"]),
    ("festival", &["festival"]),
    ("private party", &["private party", "house party", "garden party", "party"]),
];

/// Performance format keywords, most specific first
pub const GIG_TYPES: &[(&str, &[&str])] = &[
    ("string quartet", &["string quartet", "quartet"]),
    ("solo pianist", &["pianist", "piano"]),
    ("solo guitarist", &["guitarist", "acoustic guitar"]),
    ("singer", &["singer", "vocalist"]),
    ("jazz band", &["jazz band", "jazz trio", "jazz"]),
    ("dj", &["dj", "disc jockey"]),
    ("function band", &["function band", "covers band", "wedding band", "band"]),
    ("ceilidh", &["ceilidh", "barn dance"]),
    ("saxophonist", &["saxophonist", "sax"]),
];

/// Which labels feed which field in a labelled block
#[derive(Debug, Clone, Copy)]
pub struct LabelSet {
    pub client_name: &'static [&'static str],
    pub email: &'static [&'static str],
    pub phone: &'static [&'static str],
    pub date: &'static [&'static str],
    pub time: &'static [&'static str],
    pub venue: &'static [&'static str],
    pub location: &'static [&'static str],
    pub budget: &'static [&'static str],
    pub event_type: &'static [&'static str],
    pub gig_type: &'static [&'static str],
}

/// Labels clients tend to use in structured contact-form messages
pub const DIRECT_LABELS: LabelSet = LabelSet {
    client_name: &["name", "your name", "full name", "contact name"],
    email: &["email", "e-mail", "email address", "your email"],
    phone: &["phone", "telephone", "mobile", "tel", "phone number"],
    date: &["event date", "date of event", "date"],
    time: &["time", "start time", "event time", "times"],
    venue: &["venue", "venue name"],
    location: &["location", "address", "venue address"],
    budget: &["budget", "fee"],
    event_type: &["event type", "occasion", "type of event"],
    gig_type: &["act", "type of act", "performer", "service"],
};

/// Automated lead notification from a marketplace
#[derive(Debug, Clone, Copy)]
pub struct NotificationTemplate {
    pub name: &'static str,
    pub sender_domains: &'static [&'static str],
    pub body_markers: &'static [&'static str],
    pub labels: LabelSet,
}

pub const NOTIFICATION_TEMPLATES: &[NotificationTemplate] = &[
    NotificationTemplate {
        name: "encore",
        sender_domains: &["encoremusicians.com"],
        body_markers: &["encoremusicians.com", "encore musicians"],
        labels: LabelSet {
            client_name: &["client", "booker", "name"],
            email: &["email"],
            phone: &["phone"],
            date: &["date", "event date"],
            time: &["time", "performance time", "times"],
            venue: &["venue"],
            location: &["location", "address"],
            budget: &["budget", "fee", "offer"],
            event_type: &["event", "event type", "occasion"],
            gig_type: &["act", "line-up", "lineup", "looking for"],
        },
    },
    NotificationTemplate {
        name: "gig_board",
        sender_domains: &["gigsalad.com", "bark.com", "gigmasters.com"],
        body_markers: &["gigsalad", "bark.com", "new lead:", "respond to this lead"],
        labels: LabelSet {
            client_name: &["customer", "client", "contact", "name"],
            email: &["email", "contact email"],
            phone: &["phone", "contact phone"],
            date: &["event date", "date", "when"],
            time: &["event time", "start time", "time"],
            venue: &["venue", "venue name"],
            location: &["location", "where", "city", "address"],
            budget: &["budget", "price range", "estimated budget"],
            event_type: &["event type", "event", "occasion"],
            gig_type: &["service", "category", "looking for"],
        },
    },
];

/// Pick the notification template for a message, if any
///
/// Selection looks at the sender's domain and at body markers only. Subject
/// lines are ignored since clients routinely paste marketplace wording into them.
pub fn notification_template(sender: Option<&str>, body: &str) -> Option<&'static NotificationTemplate> {
    let sender_domain = sender
        .and_then(|s| RE_EMAIL.find(s))
        .and_then(|m| m.as_str().rsplit_once('@').map(|(_, d)| d.to_ascii_lowercase()));
    let body_lower = body.to_ascii_lowercase();

    NOTIFICATION_TEMPLATES.iter().find(|template| {
        let domain_hit = sender_domain.as_deref().is_some_and(|domain| {
            template
                .sender_domains
                .iter()
                .any(|d| domain == *d || domain.ends_with(&format!(".{}", d)))
        });
        domain_hit || template.body_markers.iter().any(|m| body_lower.contains(m))
    })
}

/// Collect `Label: value` lines, keyed by lowercase label (first occurrence wins)
pub fn labelled_values(text: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for caps in RE_LABEL_LINE.captures_iter(text) {
        let label = caps[1].trim().to_ascii_lowercase();
        values.entry(label).or_insert_with(|| caps[2].trim().to_string());
    }
    values
}

/// First value among `labels`, in label order
pub fn lookup<'a>(values: &'a HashMap<String, String>, labels: &[&str]) -> Option<&'a str> {
    labels
        .iter()
        .find_map(|label| values.get(*label))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Match a keyword dictionary against lowercase text on word boundaries
pub fn match_keyword(text_lower: &str, dictionary: &[(&'static str, &[&str])]) -> Option<&'static str> {
    dictionary.iter().find_map(|(name, keywords)| {
        keywords
            .iter()
            .any(|k| contains_word(text_lower, k))
            .then_some(*name)
    })
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Reduce an HTML body to plain text lines
pub fn html_to_text(html: &str) -> String {
    let without_blocks = RE_HTML_BLOCK.replace_all(html, " ");
    let with_breaks = RE_HTML_BREAK.replace_all(&without_blocks, "\n");
    let stripped = RE_HTML_TAG.replace_all(&with_breaks, " ");
    stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&pound;", "£")
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
