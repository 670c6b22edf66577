//! Booking database operations
//!
//! Functions take any SQLite executor so they run equally against the pool
//! or inside a caller's transaction.

use chrono::{NaiveDate, Utc};
use gigflow_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

use crate::models::{
    format_date, format_time, parse_date_lenient, parse_time_lenient, Booking, BookingStatus,
    NewBooking, ParseMethod,
};

const BOOKING_COLUMNS: &str = r#"
    id, user_id, title, client_name, client_email, client_phone,
    event_date, event_time, event_end_time, venue, venue_address,
    event_type, gig_type, estimated_value, status, notes, response_needed,
    parse_confidence, parse_method, source_message_id, created_at, updated_at
"#;

fn booking_from_row(row: &SqliteRow) -> Result<Booking> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let parse_method: Option<String> = row.try_get("parse_method")?;
    let event_date: Option<String> = row.try_get("event_date")?;
    let event_time: Option<String> = row.try_get("event_time")?;
    let event_end_time: Option<String> = row.try_get("event_end_time")?;

    Ok(Booking {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid booking id {}: {}", id, e)))?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        client_name: row.try_get("client_name")?,
        client_email: row.try_get("client_email")?,
        client_phone: row.try_get("client_phone")?,
        event_date: event_date.as_deref().and_then(parse_date_lenient),
        event_time: event_time.as_deref().and_then(parse_time_lenient),
        event_end_time: event_end_time.as_deref().and_then(parse_time_lenient),
        venue: row.try_get("venue")?,
        venue_address: row.try_get("venue_address")?,
        event_type: row.try_get("event_type")?,
        gig_type: row.try_get("gig_type")?,
        estimated_value: row.try_get("estimated_value")?,
        status: status.parse().map_err(Error::Internal)?,
        notes: row.try_get("notes")?,
        response_needed: row.try_get("response_needed")?,
        parse_confidence: row.try_get("parse_confidence")?,
        parse_method: parse_method
            .as_deref()
            .map(str::parse::<ParseMethod>)
            .transpose()
            .map_err(Error::Internal)?,
        source_message_id: row.try_get("source_message_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a booking unless `(user_id, source_message_id)` already exists
///
/// Returns the new id, or `None` when another writer got there first.
pub async fn insert_booking_if_absent<'e, E: SqliteExecutor<'e>>(
    executor: E,
    booking: &NewBooking,
) -> Result<Option<Uuid>> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO bookings (
            id, user_id, title, client_name, client_email, client_phone,
            event_date, event_time, event_end_time, venue, venue_address,
            event_type, gig_type, estimated_value, status, notes, response_needed,
            parse_confidence, parse_method, source_message_id, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'enquiry', ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, source_message_id) DO NOTHING
        "#,
    )
    .bind(id.to_string())
    .bind(&booking.user_id)
    .bind(&booking.title)
    .bind(&booking.client_name)
    .bind(&booking.client_email)
    .bind(&booking.client_phone)
    .bind(booking.event_date.map(format_date))
    .bind(booking.event_time.map(format_time))
    .bind(booking.event_end_time.map(format_time))
    .bind(&booking.venue)
    .bind(&booking.venue_address)
    .bind(&booking.event_type)
    .bind(&booking.gig_type)
    .bind(&booking.estimated_value)
    .bind(&booking.notes)
    .bind(booking.response_needed)
    .bind(booking.parse_confidence)
    .bind(booking.parse_method.map(ParseMethod::as_str))
    .bind(&booking.source_message_id)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok((result.rows_affected() == 1).then_some(id))
}

pub async fn get_booking<'e, E: SqliteExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<Booking>> {
    let sql = format!("SELECT {} FROM bookings WHERE id = ?", BOOKING_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(booking_from_row).transpose()
}

/// Load a booking or fail with `NotFound`
pub async fn require_booking<'e, E: SqliteExecutor<'e>>(executor: E, id: Uuid) -> Result<Booking> {
    get_booking(executor, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Booking {}", id)))
}

pub async fn find_by_source_message<'e, E: SqliteExecutor<'e>>(
    executor: E,
    user_id: &str,
    source_message_id: &str,
) -> Result<Option<Booking>> {
    let sql = format!(
        "SELECT {} FROM bookings WHERE user_id = ? AND source_message_id = ?",
        BOOKING_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(source_message_id)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(booking_from_row).transpose()
}

/// All of a user's bookings, ordered by date (undated last) then creation
pub async fn list_user_bookings<'e, E: SqliteExecutor<'e>>(
    executor: E,
    user_id: &str,
    needs_review_only: bool,
) -> Result<Vec<Booking>> {
    let sql = format!(
        r#"
        SELECT {} FROM bookings
        WHERE user_id = ? AND (? = 0 OR response_needed = 1)
        ORDER BY event_date IS NULL, event_date, created_at, id
        "#,
        BOOKING_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(needs_review_only)
        .fetch_all(executor)
        .await?;
    rows.iter().map(booking_from_row).collect()
}

/// A user's bookings on one calendar date, any status
pub async fn list_on_date<'e, E: SqliteExecutor<'e>>(
    executor: E,
    user_id: &str,
    date: NaiveDate,
) -> Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {} FROM bookings WHERE user_id = ? AND event_date = ? ORDER BY created_at, id",
        BOOKING_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(format_date(date))
        .fetch_all(executor)
        .await?;
    rows.iter().map(booking_from_row).collect()
}

/// Persist every editable column of `booking` (status excluded)
pub async fn save_booking_details<'e, E: SqliteExecutor<'e>>(executor: E, booking: &Booking) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE bookings SET
            title = ?, client_name = ?, client_email = ?, client_phone = ?,
            event_date = ?, event_time = ?, event_end_time = ?,
            venue = ?, venue_address = ?, event_type = ?, gig_type = ?,
            estimated_value = ?, notes = ?, response_needed = ?,
            parse_confidence = ?, parse_method = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&booking.title)
    .bind(&booking.client_name)
    .bind(&booking.client_email)
    .bind(&booking.client_phone)
    .bind(booking.event_date.map(format_date))
    .bind(booking.event_time.map(format_time))
    .bind(booking.event_end_time.map(format_time))
    .bind(&booking.venue)
    .bind(&booking.venue_address)
    .bind(&booking.event_type)
    .bind(&booking.gig_type)
    .bind(&booking.estimated_value)
    .bind(&booking.notes)
    .bind(booking.response_needed)
    .bind(booking.parse_confidence)
    .bind(booking.parse_method.map(ParseMethod::as_str))
    .bind(Utc::now())
    .bind(booking.id.to_string())
    .execute(executor)
    .await?;
    Ok(())
}

/// Compare-and-set status change; false when the row moved on meanwhile
pub async fn update_status<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: Uuid,
    from: BookingStatus,
    to: BookingStatus,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(to.as_str())
    .bind(Utc::now())
    .bind(id.to_string())
    .bind(from.as_str())
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn set_response_needed<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: Uuid,
    response_needed: bool,
) -> Result<bool> {
    let result = sqlx::query("UPDATE bookings SET response_needed = ?, updated_at = ? WHERE id = ?")
        .bind(response_needed)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}

