//! Conflict detector
//!
//! Pure function over a booking and its owner's booking set. Nothing here is
//! persisted: every caller recomputes from current rows, so a deleted or
//! rescheduled sibling can never leave a stale conflict behind.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus};

/// Assumed length of a performance with a start time but no end time
pub const DEFAULT_DURATION_MINUTES: i64 = 180;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Ordinal conflict risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Severity contributed by a candidate's status alone
    ///
    /// Completed engagements count as firm commitments.
    pub fn for_status(status: BookingStatus) -> Option<Severity> {
        match status {
            BookingStatus::Confirmed | BookingStatus::Completed => Some(Severity::High),
            BookingStatus::Negotiation => Some(Severity::Medium),
            BookingStatus::Enquiry => Some(Severity::Low),
            BookingStatus::Cancelled => None,
        }
    }

    /// One level up, saturating at `High`
    pub fn upgrade(self) -> Severity {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium | Severity::High => Severity::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// One same-date sibling of the booking under analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub booking_id: Uuid,
    pub conflicting_booking_id: Uuid,
    pub conflicting_title: String,
    pub conflicting_status: BookingStatus,
    pub severity: Severity,
    pub time_overlap: bool,
    pub same_venue: bool,
    /// Acknowledged by the musician; excluded from the analysis
    pub resolved: bool,
}

/// Aggregate view over all unresolved conflicts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictAnalysis {
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
    pub time_overlap: bool,
    pub same_venue: bool,
    pub can_reschedule: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub booking_id: Uuid,
    pub conflicts: Vec<ConflictInfo>,
    /// `None` when no unresolved conflict remains
    pub analysis: Option<ConflictAnalysis>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// `[start, end)` in minutes from midnight; end may pass 24:00
fn interval(start: NaiveTime, end: Option<NaiveTime>) -> (i64, i64) {
    let minutes = |t: NaiveTime| i64::from(t.hour()) * 60 + i64::from(t.minute());
    let start_min = minutes(start);
    let end_min = match end.map(minutes) {
        Some(e) if e > start_min => e,
        // Finishing "before" it starts means after midnight
        Some(e) if e < start_min => e + MINUTES_PER_DAY,
        _ => start_min + DEFAULT_DURATION_MINUTES,
    };
    (start_min, end_min)
}

/// True when both have times whose intervals intersect, or either lacks a time
pub fn times_overlap(a: &Booking, b: &Booking) -> bool {
    match (a.event_time, b.event_time) {
        (Some(a_start), Some(b_start)) => {
            let (a0, a1) = interval(a_start, a.event_end_time);
            let (b0, b1) = interval(b_start, b.event_end_time);
            a0 < b1 && b0 < a1
        }
        _ => true,
    }
}

/// Case-insensitive venue equality; unknown venues never match
pub fn same_venue(a: &Booking, b: &Booking) -> bool {
    match (a.venue.as_deref(), b.venue.as_deref()) {
        (Some(x), Some(y)) => {
            let (x, y) = (x.trim(), y.trim());
            !x.is_empty() && x.to_lowercase() == y.to_lowercase()
        }
        _ => false,
    }
}

/// Compute conflicts of `booking` against its owner's bookings
///
/// `owner_bookings` may contain `booking` itself and bookings on other dates;
/// both are ignored. Output order does not depend on input order.
pub fn detect_conflicts(
    booking: &Booking,
    owner_bookings: &[Booking],
    resolved: &HashSet<Uuid>,
) -> ConflictReport {
    let empty = ConflictReport {
        booking_id: booking.id,
        conflicts: Vec::new(),
        analysis: None,
    };
    let Some(date) = booking.event_date else {
        return empty;
    };
    if booking.status == BookingStatus::Cancelled {
        return empty;
    }

    let mut candidates: Vec<(&Booking, ConflictInfo)> = owner_bookings
        .iter()
        .filter(|c| c.id != booking.id && c.user_id == booking.user_id && c.event_date == Some(date))
        .filter_map(|c| {
            let base = Severity::for_status(c.status)?;
            let time_overlap = times_overlap(booking, c);
            let same_venue = same_venue(booking, c);
            let severity = if time_overlap || same_venue { base.upgrade() } else { base };
            Some((
                c,
                ConflictInfo {
                    booking_id: booking.id,
                    conflicting_booking_id: c.id,
                    conflicting_title: c.title.clone(),
                    conflicting_status: c.status,
                    severity,
                    time_overlap,
                    same_venue,
                    resolved: resolved.contains(&c.id),
                },
            ))
        })
        .collect();

    candidates.sort_by(|(a, ai), (b, bi)| {
        bi.severity
            .cmp(&ai.severity)
            .then_with(|| a.event_time.cmp(&b.event_time))
            .then_with(|| a.id.cmp(&b.id))
    });

    let analysis = analyze(date, candidates.iter().map(|(c, info)| (*c, info)));
    ConflictReport {
        booking_id: booking.id,
        conflicts: candidates.into_iter().map(|(_, info)| info).collect(),
        analysis,
    }
}

fn analyze<'a>(
    date: NaiveDate,
    candidates: impl Iterator<Item = (&'a Booking, &'a ConflictInfo)>,
) -> Option<ConflictAnalysis> {
    let mut base: Option<Severity> = None;
    let mut time_overlap = false;
    let mut same_venue = false;

    for (candidate, info) in candidates.filter(|(_, info)| !info.resolved) {
        let status_severity = Severity::for_status(candidate.status)?;
        base = Some(base.map_or(status_severity, |b| b.max(status_severity)));
        time_overlap |= info.time_overlap;
        same_venue |= info.same_venue;
    }

    let base = base?;
    let severity = if time_overlap || same_venue { base.upgrade() } else { base };

    let mut message = match severity {
        Severity::High => format!("Double booking risk on {}: a firm commitment or direct clash exists.", date),
        Severity::Medium => format!("Another booking on {} is still being negotiated.", date),
        Severity::Low => format!("Other enquiries are open for {}.", date),
    };
    if time_overlap {
        message.push_str(" Performance times overlap.");
    }
    if same_venue {
        message.push_str(" Same venue.");
    }

    let recommendation = match severity {
        Severity::High => "Decline or propose another date; the existing commitment takes priority.",
        Severity::Medium => "Settle the pending negotiation before committing to this date.",
        Severity::Low => "Keep both enquiries open and prioritise whichever confirms first.",
    }
    .to_string();

    Some(ConflictAnalysis {
        severity,
        message,
        recommendation,
        time_overlap,
        same_venue,
        can_reschedule: severity != Severity::High,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn booking(status: BookingStatus, time: Option<(u32, u32)>, venue: Option<&str>) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            title: "Gig".to_string(),
            client_name: "Client".to_string(),
            client_email: None,
            client_phone: None,
            event_date: NaiveDate::from_ymd_opt(2025, 9, 20),
            event_time: time.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)),
            event_end_time: None,
            venue: venue.map(str::to_string),
            venue_address: None,
            event_type: None,
            gig_type: None,
            estimated_value: None,
            status,
            notes: None,
            response_needed: false,
            parse_confidence: None,
            parse_method: None,
            source_message_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_confirmed_sibling_is_high() {
        let b = booking(BookingStatus::Enquiry, None, None);
        let c = booking(BookingStatus::Confirmed, None, None);
        let report = detect_conflicts(&b, &[b.clone(), c.clone()], &HashSet::new());
        let analysis = report.analysis.unwrap();
        assert_eq!(analysis.severity, Severity::High);
        assert!(!analysis.can_reschedule);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].conflicting_booking_id, c.id);
    }

    #[test]
    fn test_two_enquiries_apart_is_low() {
        let b = booking(BookingStatus::Enquiry, Some((12, 0)), Some("Town Hall"));
        let mut c = booking(BookingStatus::Enquiry, Some((19, 0)), Some("The Barn"));
        c.event_end_time = Some(t(22, 0));
        let report = detect_conflicts(&b, &[c], &HashSet::new());
        let analysis = report.analysis.unwrap();
        assert_eq!(analysis.severity, Severity::Low);
        assert!(!analysis.time_overlap);
        assert!(!analysis.same_venue);
        assert!(analysis.can_reschedule);
    }

    #[test]
    fn test_missing_time_counts_as_overlap() {
        let b = booking(BookingStatus::Enquiry, None, Some("A"));
        let c = booking(BookingStatus::Enquiry, Some((19, 0)), Some("B"));
        let report = detect_conflicts(&b, &[c], &HashSet::new());
        assert!(report.conflicts[0].time_overlap);
        assert_eq!(report.analysis.unwrap().severity, Severity::Medium);
    }

    #[test]
    fn test_same_venue_case_insensitive_upgrades() {
        let b = booking(BookingStatus::Enquiry, Some((10, 0)), Some("The Grand Hotel"));
        let c = booking(BookingStatus::Negotiation, Some((18, 0)), Some("the grand hotel "));
        let report = detect_conflicts(&b, &[c], &HashSet::new());
        assert!(report.conflicts[0].same_venue);
        assert!(!report.conflicts[0].time_overlap);
        assert_eq!(report.analysis.unwrap().severity, Severity::High);
    }

    #[test]
    fn test_upgrade_never_exceeds_high() {
        let b = booking(BookingStatus::Enquiry, None, Some("Hall"));
        let c = booking(BookingStatus::Confirmed, None, Some("Hall"));
        let report = detect_conflicts(&b, &[c], &HashSet::new());
        assert_eq!(report.analysis.unwrap().severity, Severity::High);
    }

    #[test]
    fn test_cancelled_and_other_dates_ignored() {
        let b = booking(BookingStatus::Enquiry, None, None);
        let cancelled = booking(BookingStatus::Cancelled, None, None);
        let mut other_day = booking(BookingStatus::Confirmed, None, None);
        other_day.event_date = NaiveDate::from_ymd_opt(2025, 9, 21);
        let mut other_user = booking(BookingStatus::Confirmed, None, None);
        other_user.user_id = "u2".to_string();
        let report = detect_conflicts(&b, &[cancelled, other_day, other_user], &HashSet::new());
        assert!(report.is_empty());
        assert!(report.analysis.is_none());
    }

    #[test]
    fn test_undated_or_cancelled_subject_has_no_conflicts() {
        let mut b = booking(BookingStatus::Enquiry, None, None);
        let c = booking(BookingStatus::Confirmed, None, None);
        b.event_date = None;
        assert!(detect_conflicts(&b, &[c.clone()], &HashSet::new()).is_empty());
        b.event_date = c.event_date;
        b.status = BookingStatus::Cancelled;
        assert!(detect_conflicts(&b, &[c], &HashSet::new()).is_empty());
    }

    #[test]
    fn test_result_independent_of_input_order() {
        let b = booking(BookingStatus::Enquiry, Some((19, 0)), None);
        let c1 = booking(BookingStatus::Enquiry, Some((9, 0)), None);
        let c2 = booking(BookingStatus::Negotiation, Some((20, 0)), None);
        let c3 = booking(BookingStatus::Enquiry, Some((13, 0)), None);
        let forward = detect_conflicts(&b, &[c1.clone(), c2.clone(), c3.clone()], &HashSet::new());
        let backward = detect_conflicts(&b, &[c3, c2.clone(), c1], &HashSet::new());
        assert_eq!(forward, backward);
        assert_eq!(forward.conflicts[0].conflicting_booking_id, c2.id);
        assert_eq!(forward.analysis.unwrap().severity, Severity::High);
    }

    #[test]
    fn test_resolved_conflicts_reported_but_not_analyzed() {
        let b = booking(BookingStatus::Enquiry, None, None);
        let confirmed = booking(BookingStatus::Confirmed, None, None);
        let enquiry = booking(BookingStatus::Enquiry, Some((10, 0)), None);
        let resolved: HashSet<Uuid> = [confirmed.id].into_iter().collect();
        let report = detect_conflicts(&b, &[confirmed, enquiry], &resolved);
        assert_eq!(report.conflicts.len(), 2);
        assert!(report.conflicts.iter().any(|c| c.resolved));
        // Only the open enquiry counts; missing time on b means overlap
        assert_eq!(report.analysis.unwrap().severity, Severity::Medium);

        let b2 = booking(BookingStatus::Enquiry, None, None);
        let only = booking(BookingStatus::Confirmed, None, None);
        let resolved: HashSet<Uuid> = [only.id].into_iter().collect();
        let report = detect_conflicts(&b2, &[only], &resolved);
        assert_eq!(report.conflicts.len(), 1);
        assert!(report.analysis.is_none());
    }

    #[test]
    fn test_interval_wraps_past_midnight() {
        let mut a = booking(BookingStatus::Enquiry, Some((22, 0)), None);
        a.event_end_time = Some(t(1, 0));
        let b = booking(BookingStatus::Enquiry, Some((23, 30)), None);
        assert!(times_overlap(&a, &b));
        let c = booking(BookingStatus::Enquiry, Some((18, 0)), None);
        // 18:00 + 3h default ends 21:00, before 22:00
        assert!(!times_overlap(&a, &c));
    }
}
