//! Forwarded-message unwrapping
//!
//! Musicians often forward enquiries from a personal mailbox to their leads
//! address. The client is the sender of the innermost forwarded block, not the
//! forwarding account.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_FORWARD_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[\s>]*-*\s*(?:forwarded message|begin forwarded message:?|original message)\s*-*\s*$",
    )
    .unwrap()
});

static RE_MAILTO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[mailto:([^\]]+)\]").unwrap()
});

const FORWARD_HEADERS: &[&str] = &["from", "sent", "date", "to", "cc", "subject", "reply-to"];

/// Body with forwarding wrappers removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped {
    /// `From:` line of the innermost forwarded block
    pub original_from: Option<String>,
    /// `Subject:` line of the innermost forwarded block
    pub original_subject: Option<String>,
    pub body: String,
    pub forwarded: bool,
}

/// Strip forwarding layers, keeping the innermost message
pub fn unwrap_forwarded(body: &str) -> Unwrapped {
    let Some(marker) = RE_FORWARD_MARKER.find_iter(body).last() else {
        return Unwrapped {
            original_from: None,
            original_subject: None,
            body: body.trim().to_string(),
            forwarded: false,
        };
    };

    let inner: Vec<String> = body[marker.end()..]
        .lines()
        .map(|line| line.trim_start_matches(|c: char| c == '>' || c == ' ').to_string())
        .collect();

    let mut original_from = None;
    let mut original_subject = None;
    let mut idx = 0;

    while idx < inner.len() && inner[idx].trim().is_empty() {
        idx += 1;
    }
    while idx < inner.len() {
        let line = inner[idx].trim();
        let Some((name, value)) = line.split_once(':') else {
            break;
        };
        let name = name.trim().to_ascii_lowercase();
        if !FORWARD_HEADERS.contains(&name.as_str()) {
            break;
        }
        let value = value.trim();
        match name.as_str() {
            "from" if original_from.is_none() => original_from = Some(normalize_from(value)),
            "subject" if original_subject.is_none() => {
                original_subject = Some(value.to_string())
            }
            _ => {}
        }
        idx += 1;
    }

    let body = inner[idx..].join("\n").trim().to_string();
    Unwrapped {
        original_from,
        original_subject,
        body,
        forwarded: true,
    }
}

/// Outlook writes `Jane Doe [mailto:jane@example.com]`
fn normalize_from(value: &str) -> String {
    match RE_MAILTO.captures(value) {
        Some(caps) => {
            let name = RE_MAILTO.replace(value, "");
            let name = name.trim().trim_matches('"');
            if name.is_empty() {
                caps[1].to_string()
            } else {
                format!("{} <{}>", name, &caps[1])
            }
        }
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message_untouched() {
        let u = unwrap_forwarded("  Hello, are you free?  ");
        assert!(!u.forwarded);
        assert_eq!(u.body, "Hello, are you free?");
        assert_eq!(u.original_from, None);
    }

    #[test]
    fn test_gmail_forward() {
        let body = "FYI\n\n---------- Forwarded message ---------\nFrom: Jane Doe <jane@example.com>\nDate: Wed, 16 Jul 2025 at 09:30\nSubject: Wedding enquiry\nTo: <me@example.org>\n\nHi, are you free on 2025-09-20?";
        let u = unwrap_forwarded(body);
        assert!(u.forwarded);
        assert_eq!(u.original_from.as_deref(), Some("Jane Doe <jane@example.com>"));
        assert_eq!(u.original_subject.as_deref(), Some("Wedding enquiry"));
        assert_eq!(u.body, "Hi, are you free on 2025-09-20?");
    }

    #[test]
    fn test_nested_forward_uses_innermost() {
        let body = "---------- Forwarded message ---------\nFrom: Agent <agent@agency.com>\n\nsee below\n\n-----Original Message-----\nFrom: Bob Smith [mailto:bob@example.com]\nSent: Monday\n\nParty next Saturday";
        let u = unwrap_forwarded(body);
        assert_eq!(u.original_from.as_deref(), Some("Bob Smith <bob@example.com>"));
        assert_eq!(u.body, "Party next Saturday");
    }

    #[test]
    fn test_quoted_apple_forward() {
        let body = "Begin forwarded message:\n\n> From: Carol <carol@example.com>\n> Subject: Gig\n>\n> Hello there";
        let u = unwrap_forwarded(body);
        assert_eq!(u.original_from.as_deref(), Some("Carol <carol@example.com>"));
        assert_eq!(u.body, "Hello there");
    }
}
