//! Booking service
//!
//! Everything that mutates a user's booking set outside the webhook path:
//! manual entry, edits, lifecycle actions, conflict acknowledgement and the
//! review queue. Writers hold the owner's write lock; conflict queries hold
//! the read lock.

use chrono::NaiveDate;
use gigflow_common::events::{EventBus, GigEvent};
use gigflow_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::conflicts::{detect_conflicts, ConflictReport};
use crate::db::documents::{self, Contract, Invoice};
use crate::db::{bookings, resolutions, users};
use crate::lifecycle::{next_status, Action, ProgressTags};
use crate::locks::UserLocks;
use crate::models::{
    parse_date_lenient, parse_time_lenient, Booking, BookingUpdate, NewBooking, ParseMethod,
};

/// Recompute the conflict report for `booking` from current rows
///
/// Callers hold the owner's lock so the booking set cannot change underneath.
pub async fn conflicts_for<'c, E>(executor: E, booking: &Booking) -> Result<ConflictReport>
where
    E: SqliteExecutor<'c> + Copy,
{
    let Some(date) = booking.event_date else {
        return Ok(detect_conflicts(booking, &[], &Default::default()));
    };
    let siblings = bookings::list_on_date(executor, &booking.user_id, date).await?;
    let resolved = resolutions::resolved_with(executor, booking.id).await?;
    Ok(detect_conflicts(booking, &siblings, &resolved))
}

/// Broadcast a `ConflictDetected` event when any unresolved conflict exists
pub fn emit_conflicts(events: &EventBus, booking: &Booking, report: &ConflictReport) {
    let (Some(analysis), Some(date)) = (&report.analysis, booking.event_date) else {
        return;
    };
    info!(
        booking_id = %booking.id,
        severity = analysis.severity.as_str(),
        conflicts = report.conflicts.len(),
        "Booking date conflicts with existing bookings"
    );
    events.emit_lossy(GigEvent::ConflictDetected {
        booking_id: booking.id,
        user_id: booking.user_id.clone(),
        event_date: date,
        severity: analysis.severity.as_str().to_string(),
        conflicting: report
            .conflicts
            .iter()
            .filter(|c| !c.resolved)
            .map(|c| c.conflicting_booking_id)
            .collect(),
        timestamp: gigflow_common::time::now(),
    });
}

/// Manually entered booking
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualBooking {
    pub user_id: String,
    pub title: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub event_date: Option<String>,
    pub event_time: Option<String>,
    pub event_end_time: Option<String>,
    pub venue: Option<String>,
    pub venue_address: Option<String>,
    pub event_type: Option<String>,
    pub gig_type: Option<String>,
    pub estimated_value: Option<String>,
    pub notes: Option<String>,
}

/// Booking plus its freshly computed conflicts
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingWithConflicts {
    pub booking: Booking,
    pub conflicts: ConflictReport,
}

/// Booking plus derived progress and related documents
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    pub booking: Booking,
    pub progress: ProgressTags,
    pub contracts: Vec<Contract>,
    pub invoices: Vec<Invoice>,
}

/// Extra input some lifecycle actions need
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionInput {
    /// `send-invoice`: amount in minor currency units
    pub amount_minor: Option<i64>,
    /// `mark-paid`: which invoice was paid
    pub invoice_id: Option<Uuid>,
}

/// Result of a lifecycle action
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub booking: Booking,
    pub progress: ProgressTags,
    pub status_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<Contract>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<Invoice>,
}

/// Invalid date or time text is dropped rather than stored
fn lenient<T>(field: &str, raw: Option<&str>, parse: fn(&str) -> Option<T>) -> Option<T> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let parsed = parse(raw);
    if parsed.is_none() {
        warn!(field, value = raw, "Discarding unparseable value");
    }
    parsed
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

fn apply_update(booking: &mut Booking, update: BookingUpdate) -> Result<()> {
    if let Some(title) = update.title {
        booking.title = required("title", &title)?;
    }
    if let Some(name) = update.client_name {
        booking.client_name = required("clientName", &name)?;
    }
    let text = |slot: &mut Option<String>, value: Option<Option<String>>| {
        if let Some(value) = value {
            *slot = non_blank(value);
        }
    };
    text(&mut booking.client_email, update.client_email);
    text(&mut booking.client_phone, update.client_phone);
    text(&mut booking.venue, update.venue);
    text(&mut booking.venue_address, update.venue_address);
    text(&mut booking.event_type, update.event_type);
    text(&mut booking.gig_type, update.gig_type);
    text(&mut booking.estimated_value, update.estimated_value);
    text(&mut booking.notes, update.notes);

    if let Some(date) = update.event_date {
        booking.event_date = lenient("eventDate", date.as_deref(), parse_date_lenient);
    }
    if let Some(time) = update.event_time {
        booking.event_time = lenient("eventTime", time.as_deref(), parse_time_lenient);
    }
    if let Some(time) = update.event_end_time {
        booking.event_end_time = lenient("eventEndTime", time.as_deref(), parse_time_lenient);
    }
    Ok(())
}

/// Booking operations shared by the HTTP handlers
#[derive(Clone)]
pub struct BookingService {
    pool: SqlitePool,
    locks: UserLocks,
    events: EventBus,
}

impl BookingService {
    pub fn new(pool: SqlitePool, locks: UserLocks, events: EventBus) -> Self {
        Self { pool, locks, events }
    }

    pub async fn detail(&self, booking_id: Uuid) -> Result<BookingDetail> {
        let booking = bookings::require_booking(&self.pool, booking_id).await?;
        let contracts = documents::list_contracts(&self.pool, booking_id).await?;
        let invoices = documents::list_invoices(&self.pool, booking_id).await?;
        Ok(BookingDetail {
            progress: ProgressTags::derive(&contracts, &invoices),
            booking,
            contracts,
            invoices,
        })
    }

    pub async fn list(&self, user_id: &str, needs_review_only: bool) -> Result<Vec<Booking>> {
        if users::get_user(&self.pool, user_id).await?.is_none() {
            return Err(Error::NotFound(format!("User {}", user_id)));
        }
        bookings::list_user_bookings(&self.pool, user_id, needs_review_only).await
    }

    /// Enter a booking by hand; conflicts are reported, never blocking
    pub async fn create_manual(&self, input: ManualBooking) -> Result<BookingWithConflicts> {
        let user_id = required("userId", &input.user_id)?;
        if users::get_user(&self.pool, &user_id).await?.is_none() {
            return Err(Error::NotFound(format!("User {}", user_id)));
        }

        let new_booking = NewBooking {
            user_id: user_id.clone(),
            title: required("title", &input.title)?,
            client_name: required("clientName", &input.client_name)?,
            client_email: non_blank(input.client_email),
            client_phone: non_blank(input.client_phone),
            event_date: lenient("eventDate", input.event_date.as_deref(), parse_date_lenient),
            event_time: lenient("eventTime", input.event_time.as_deref(), parse_time_lenient),
            event_end_time: lenient(
                "eventEndTime",
                input.event_end_time.as_deref(),
                parse_time_lenient,
            ),
            venue: non_blank(input.venue),
            venue_address: non_blank(input.venue_address),
            event_type: non_blank(input.event_type),
            gig_type: non_blank(input.gig_type),
            estimated_value: non_blank(input.estimated_value),
            notes: non_blank(input.notes),
            parse_method: Some(ParseMethod::Manual),
            ..Default::default()
        };

        let _guard = self.locks.write(&user_id).await;
        let id = bookings::insert_booking_if_absent(&self.pool, &new_booking)
            .await?
            .ok_or_else(|| Error::Internal("Manual booking insert was ignored".to_string()))?;
        let booking = bookings::require_booking(&self.pool, id).await?;
        let conflicts = conflicts_for(&self.pool, &booking).await?;
        info!(booking_id = %booking.id, user_id = %user_id, "Created manual booking");
        emit_conflicts(&self.events, &booking, &conflicts);

        Ok(BookingWithConflicts { booking, conflicts })
    }

    /// Edit details; status is untouched
    pub async fn update(&self, booking_id: Uuid, update: BookingUpdate) -> Result<BookingWithConflicts> {
        let owner = bookings::require_booking(&self.pool, booking_id).await?.user_id;
        let _guard = self.locks.write(&owner).await;

        let mut booking = bookings::require_booking(&self.pool, booking_id).await?;
        apply_update(&mut booking, update)?;
        bookings::save_booking_details(&self.pool, &booking).await?;

        let booking = bookings::require_booking(&self.pool, booking_id).await?;
        let conflicts = conflicts_for(&self.pool, &booking).await?;
        info!(booking_id = %booking_id, "Updated booking details");
        emit_conflicts(&self.events, &booking, &conflicts);

        Ok(BookingWithConflicts { booking, conflicts })
    }

    /// Fresh conflict report against a consistent snapshot of the owner's set
    pub async fn conflicts(&self, booking_id: Uuid) -> Result<ConflictReport> {
        let owner = bookings::require_booking(&self.pool, booking_id).await?.user_id;
        let _guard = self.locks.read(&owner).await;
        let booking = bookings::require_booking(&self.pool, booking_id).await?;
        conflicts_for(&self.pool, &booking).await
    }

    /// Acknowledge the conflict between two bookings of one owner
    pub async fn resolve_conflict(&self, booking_id: Uuid, other_id: Uuid) -> Result<ConflictReport> {
        if booking_id == other_id {
            return Err(Error::InvalidInput("A booking cannot conflict with itself".to_string()));
        }
        let booking = bookings::require_booking(&self.pool, booking_id).await?;
        let other = bookings::require_booking(&self.pool, other_id).await?;
        if booking.user_id != other.user_id {
            return Err(Error::InvalidInput(format!(
                "Bookings {} and {} belong to different users",
                booking_id, other_id
            )));
        }

        let _guard = self.locks.write(&booking.user_id).await;
        let mut conn = self.pool.acquire().await?;
        resolutions::record_resolution(&mut conn, booking_id, other_id).await?;
        drop(conn);

        info!(booking_id = %booking_id, other_booking_id = %other_id, "Conflict acknowledged");
        let booking = bookings::require_booking(&self.pool, booking_id).await?;
        conflicts_for(&self.pool, &booking).await
    }

    /// Clear the review flag after a musician has checked the details
    pub async fn mark_reviewed(&self, booking_id: Uuid) -> Result<Booking> {
        let owner = bookings::require_booking(&self.pool, booking_id).await?.user_id;
        let _guard = self.locks.write(&owner).await;
        bookings::set_response_needed(&self.pool, booking_id, false).await?;
        info!(booking_id = %booking_id, "Booking marked as reviewed");
        bookings::require_booking(&self.pool, booking_id).await
    }

    /// Perform a lifecycle action and its side effect atomically
    ///
    /// The action is validated against the records as they stand, the side
    /// effect is written, and the status is then derived from the records as
    /// they are afterwards. Nothing is written if either check fails.
    pub async fn apply_action(
        &self,
        booking_id: Uuid,
        action: Action,
        input: ActionInput,
        today: NaiveDate,
    ) -> Result<ActionOutcome> {
        let owner = bookings::require_booking(&self.pool, booking_id).await?.user_id;
        let _guard = self.locks.write(&owner).await;

        let mut tx = self.pool.begin().await?;
        let booking = bookings::require_booking(&mut *tx, booking_id).await?;
        let before = ProgressTags::derive(
            &documents::list_contracts(&mut *tx, booking_id).await?,
            &documents::list_invoices(&mut *tx, booking_id).await?,
        );
        next_status(&booking, action, &before, today)?;

        let mut contract = None;
        let mut invoice = None;
        match action {
            Action::SendContract => {
                contract = Some(documents::insert_contract(&mut *tx, booking_id).await?);
            }
            Action::SignContract => {
                if !documents::sign_latest_contract(&mut *tx, booking_id).await? {
                    return Err(Error::InvalidTransition(
                        "no unsigned contract to sign".to_string(),
                    ));
                }
            }
            Action::SendInvoice => {
                let amount = input.amount_minor.ok_or_else(|| {
                    Error::InvalidInput("send-invoice requires amountMinor".to_string())
                })?;
                invoice = Some(documents::insert_invoice(&mut *tx, booking_id, amount).await?);
            }
            Action::MarkPaid => {
                let invoice_id = input.invoice_id.ok_or_else(|| {
                    Error::InvalidInput("mark-paid requires invoiceId".to_string())
                })?;
                if !documents::mark_invoice_paid(&mut *tx, booking_id, invoice_id).await? {
                    return Err(Error::InvalidInput(format!(
                        "Invoice {} is not an unpaid invoice of booking {}",
                        invoice_id, booking_id
                    )));
                }
            }
            Action::MarkCompleted | Action::Reject => {}
        }

        let contracts = documents::list_contracts(&mut *tx, booking_id).await?;
        let invoices = documents::list_invoices(&mut *tx, booking_id).await?;
        let progress = ProgressTags::derive(&contracts, &invoices);
        let new_status = next_status(&booking, action, &progress, today)?;

        let status_changed = new_status != booking.status;
        if status_changed
            && !bookings::update_status(&mut *tx, booking_id, booking.status, new_status).await?
        {
            return Err(Error::InvalidTransition(format!(
                "booking {} changed status concurrently",
                booking_id
            )));
        }

        let updated = bookings::require_booking(&mut *tx, booking_id).await?;
        tx.commit().await?;

        info!(
            booking_id = %booking_id,
            action = action.as_str(),
            old_status = booking.status.as_str(),
            new_status = new_status.as_str(),
            "Applied booking action"
        );
        if status_changed {
            self.events.emit_lossy(GigEvent::BookingStatusChanged {
                booking_id,
                user_id: updated.user_id.clone(),
                action: action.as_str().to_string(),
                old_status: booking.status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
                timestamp: gigflow_common::time::now(),
            });
        }

        Ok(ActionOutcome {
            booking: updated,
            progress,
            status_changed,
            contract,
            invoice,
        })
    }
}
