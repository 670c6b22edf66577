//! Raw webhook payload archive
//!
//! Each accepted delivery is stored once per `(user_id, source_message_id)`
//! together with the reference date used to resolve relative dates, so a
//! later re-parse reproduces the original result.

use chrono::{DateTime, NaiveDate, Utc};
use gigflow_common::{Error, Result};
use sqlx::{Row, SqliteExecutor};

use crate::ingest::RawPayload;
use crate::models::{format_date, parse_date_lenient};

/// Archived payload
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPayload {
    pub user_id: String,
    pub source_message_id: String,
    pub reference_date: NaiveDate,
    pub payload: RawPayload,
    pub received_at: DateTime<Utc>,
}

/// Store a payload; a redelivery leaves the first copy in place
pub async fn insert_payload_if_absent<'e, E: SqliteExecutor<'e>>(
    executor: E,
    user_id: &str,
    source_message_id: &str,
    reference_date: NaiveDate,
    payload: &RawPayload,
) -> Result<bool> {
    let json = serde_json::to_string(payload)
        .map_err(|e| Error::Internal(format!("Failed to serialize payload: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO raw_payloads (user_id, source_message_id, reference_date, payload, received_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id, source_message_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(source_message_id)
    .bind(format_date(reference_date))
    .bind(json)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn get_payload<'e, E: SqliteExecutor<'e>>(
    executor: E,
    user_id: &str,
    source_message_id: &str,
) -> Result<Option<StoredPayload>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, source_message_id, reference_date, payload, received_at
        FROM raw_payloads
        WHERE user_id = ? AND source_message_id = ?
        "#,
    )
    .bind(user_id)
    .bind(source_message_id)
    .fetch_optional(executor)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let reference_date: String = row.try_get("reference_date")?;
    let payload: String = row.try_get("payload")?;

    Ok(Some(StoredPayload {
        user_id: row.try_get("user_id")?,
        source_message_id: row.try_get("source_message_id")?,
        reference_date: parse_date_lenient(&reference_date).ok_or_else(|| {
            Error::Internal(format!("Stored reference date is invalid: {}", reference_date))
        })?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| Error::Internal(format!("Stored payload is not valid JSON: {}", e)))?,
        received_at: row.try_get("received_at")?,
    }))
}
