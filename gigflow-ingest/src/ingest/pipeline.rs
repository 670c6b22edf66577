//! Ingestion pipeline
//!
//! webhook payload → normalizer → heuristic extractor → (confidence check) →
//! AI fallback → materializer → booking. One code path serves every caller;
//! verbosity is a matter of log level, not of a separate handler.

use chrono::NaiveDate;
use gigflow_common::events::{EventBus, GigEvent};
use gigflow_common::time::parse_message_timestamp;
use gigflow_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ai_fallback::AiFallbackParser;
use super::heuristic::HeuristicExtractor;
use super::materializer::{self, Materialized};
use super::normalizer::{FieldNormalizer, RawPayload};
use super::types::CanonicalEnvelope;
use crate::activity::{ActivityEntry, ActivityLog, DeliveryOutcome};
use crate::conflicts::ConflictReport;
use crate::db::{bookings, payloads};
use crate::locks::UserLocks;
use crate::models::{Booking, ParseMethod};
use crate::services::bookings::{conflicts_for, emit_conflicts};

/// What happened to one delivery
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The booking for this message, new or pre-existing
    pub booking: Option<Booking>,
    pub created: bool,
    /// Caller-safe description of why no booking was produced
    pub error: Option<String>,
    pub conflicts: Option<ConflictReport>,
}

impl IngestOutcome {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            booking: None,
            created: false,
            error: Some(reason.into()),
            conflicts: None,
        }
    }

    pub fn success(&self) -> bool {
        self.booking.is_some()
    }
}

/// Shared pipeline; cheap to clone
#[derive(Clone)]
pub struct IngestPipeline {
    pool: SqlitePool,
    locks: UserLocks,
    events: EventBus,
    activity: ActivityLog,
    normalizer: FieldNormalizer,
    extractor: HeuristicExtractor,
    ai: AiFallbackParser,
    default_user_id: String,
}

impl IngestPipeline {
    pub fn new(
        pool: SqlitePool,
        locks: UserLocks,
        events: EventBus,
        activity: ActivityLog,
        ai: AiFallbackParser,
        default_user_id: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            locks,
            events,
            activity,
            normalizer: FieldNormalizer::new(),
            extractor: HeuristicExtractor::new(),
            ai,
            default_user_id: default_user_id.into(),
        }
    }

    /// Process one delivery; never fails
    ///
    /// `received_on` is the receipt date, used as the reference date when the
    /// message carries no parseable timestamp of its own.
    pub async fn ingest(&self, payload: RawPayload, received_on: NaiveDate) -> IngestOutcome {
        let normalized = self.normalizer.normalize(&payload);
        let mut entry = ActivityEntry::new(DeliveryOutcome::Rejected);
        entry.matched_aliases = normalized
            .matches
            .iter()
            .map(|m| format!("{}<-{}", m.field, m.alias))
            .collect();

        if normalized.envelope.is_empty() {
            warn!(keys = ?payload.keys().collect::<Vec<_>>(), "Webhook payload has no sender or body, rejecting");
            let reason = "payload contains no sender or message body";
            entry.error = Some(reason.to_string());
            self.activity.record(entry).await;
            return IngestOutcome::rejected(reason);
        }

        let outcome = self
            .process(&payload, &normalized.envelope, received_on, &mut entry)
            .await;

        match outcome {
            Ok(outcome) => {
                entry.outcome = if outcome.created {
                    DeliveryOutcome::Created
                } else {
                    DeliveryOutcome::Duplicate
                };
                entry.booking_id = outcome.booking.as_ref().map(|b| b.id);
                self.activity.record(entry).await;
                outcome
            }
            Err(e) => {
                error!(error = %e, source_message_id = ?entry.source_message_id, "Enquiry ingestion failed");
                entry.outcome = DeliveryOutcome::Failed;
                entry.error = Some(e.to_string());
                self.activity.record(entry).await;
                IngestOutcome::rejected("internal error while storing enquiry")
            }
        }
    }

    async fn process(
        &self,
        payload: &RawPayload,
        envelope: &CanonicalEnvelope,
        received_on: NaiveDate,
        entry: &mut ActivityEntry,
    ) -> Result<IngestOutcome> {
        let owner =
            materializer::resolve_owner(&self.pool, envelope.to.as_deref(), &self.default_user_id)
                .await?;
        let message_id = materializer::source_message_id(envelope);
        entry.user_id = Some(owner.clone());
        entry.source_message_id = Some(message_id.clone());

        // Cheap redelivery check before any extraction work
        if let Some(existing) = bookings::find_by_source_message(&self.pool, &owner, &message_id).await? {
            info!(booking_id = %existing.id, source_message_id = %message_id, "Duplicate delivery");
            self.emit_duplicate(&existing, &message_id);
            return Ok(IngestOutcome {
                booking: Some(existing),
                created: false,
                error: None,
                conflicts: None,
            });
        }

        let reference_date = envelope
            .timestamp
            .as_deref()
            .and_then(parse_message_timestamp)
            .map(|ts| ts.date_naive())
            .unwrap_or(received_on);
        debug!(%reference_date, "Resolved reference date");

        let heuristic = self.extractor.extract(envelope, reference_date);
        let original_body = heuristic.cleaned_body.clone();
        let subject = envelope.subject.clone().unwrap_or_default();

        // No lock or transaction is held across the model call
        let refined = self.ai.refine(heuristic, &subject, reference_date).await;
        entry.parse_method = Some(refined.method.as_str().to_string());
        entry.confidence = Some(refined.confidence);

        if refined.method == ParseMethod::Degraded {
            self.events.emit_lossy(GigEvent::ExtractionDegraded {
                source_message_id: message_id.clone(),
                reason: refined.degraded_reason.clone().unwrap_or_default(),
                timestamp: gigflow_common::time::now(),
            });
        }

        let new_booking =
            materializer::build_new_booking(&owner, &message_id, envelope, &refined, &original_body);

        let guard = self.locks.write(&owner).await;
        let Materialized { booking, created } =
            materializer::materialize(&self.pool, &new_booking, reference_date, payload).await?;
        let conflicts = conflicts_for(&self.pool, &booking).await?;
        drop(guard);

        if created {
            self.events.emit_lossy(GigEvent::EnquiryIngested {
                booking_id: booking.id,
                user_id: booking.user_id.clone(),
                source_message_id: message_id.clone(),
                confidence: refined.confidence,
                needs_review: booking.response_needed,
                timestamp: gigflow_common::time::now(),
            });
            emit_conflicts(&self.events, &booking, &conflicts);
        } else {
            self.emit_duplicate(&booking, &message_id);
        }

        Ok(IngestOutcome {
            booking: Some(booking),
            created,
            error: None,
            conflicts: Some(conflicts),
        })
    }

    fn emit_duplicate(&self, booking: &Booking, message_id: &str) {
        self.events.emit_lossy(GigEvent::DuplicateDelivery {
            booking_id: booking.id,
            user_id: booking.user_id.clone(),
            source_message_id: message_id.to_string(),
            timestamp: gigflow_common::time::now(),
        });
    }

    /// Re-run extraction on a booking's stored payload
    ///
    /// Uses the reference date stored with the payload, so the result does not
    /// depend on when the re-parse happens. Only empty fields are filled; the
    /// review flag, confidence and method are refreshed.
    pub async fn reparse(&self, booking_id: Uuid) -> Result<Booking> {
        let booking = bookings::require_booking(&self.pool, booking_id).await?;
        let message_id = booking.source_message_id.clone().ok_or_else(|| {
            Error::InvalidInput(format!("Booking {} was not created from an email", booking_id))
        })?;
        let stored = payloads::get_payload(&self.pool, &booking.user_id, &message_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Stored payload for booking {}", booking_id)))?;

        let normalized = self.normalizer.normalize(&stored.payload);
        let heuristic = self.extractor.extract(&normalized.envelope, stored.reference_date);
        let subject = normalized.envelope.subject.clone().unwrap_or_default();
        let refined = self.ai.refine(heuristic, &subject, stored.reference_date).await;

        let _guard = self.locks.write(&booking.user_id).await;
        let mut current = bookings::require_booking(&self.pool, booking_id).await?;
        let changed = materializer::fill_missing(&mut current, &refined);
        current.response_needed = refined.response_needed;
        current.parse_confidence = Some(refined.confidence);
        current.parse_method = Some(refined.method);
        bookings::save_booking_details(&self.pool, &current).await?;

        info!(
            booking_id = %booking_id,
            fields_filled = changed,
            method = refined.method.as_str(),
            "Re-parsed stored enquiry"
        );
        bookings::require_booking(&self.pool, booking_id).await
    }
}
