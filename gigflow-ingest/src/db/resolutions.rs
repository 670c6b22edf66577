//! Conflict acknowledgements
//!
//! Pairs are stored in both directions so either booking's report sees them.
//! They never decide whether a conflict exists, only whether it was reviewed.

use chrono::Utc;
use gigflow_common::Result;
use sqlx::{Row, SqliteConnection};
use std::collections::HashSet;
use uuid::Uuid;

pub async fn record_resolution(conn: &mut SqliteConnection, booking_id: Uuid, other_id: Uuid) -> Result<()> {
    let now = Utc::now();
    for (a, b) in [(booking_id, other_id), (other_id, booking_id)] {
        sqlx::query(
            "INSERT OR IGNORE INTO conflict_resolutions (booking_id, other_booking_id, resolved_at) VALUES (?, ?, ?)",
        )
        .bind(a.to_string())
        .bind(b.to_string())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Ids of bookings whose conflict with `booking_id` was acknowledged
pub async fn resolved_with<'e, E: sqlx::SqliteExecutor<'e>>(
    executor: E,
    booking_id: Uuid,
) -> Result<HashSet<Uuid>> {
    let rows = sqlx::query("SELECT other_booking_id FROM conflict_resolutions WHERE booking_id = ?")
        .bind(booking_id.to_string())
        .fetch_all(executor)
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.try_get::<String, _>("other_booking_id").ok())
        .filter_map(|id| Uuid::parse_str(&id).ok())
        .collect())
}
