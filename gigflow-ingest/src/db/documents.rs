//! Contract and invoice records
//!
//! Only the side effects the booking lifecycle depends on are kept here:
//! whether a contract was sent or signed, and whether invoices are paid.
//! Document generation and payment processing live elsewhere.

use chrono::{DateTime, Utc};
use gigflow_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Sent,
    Signed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Sent,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub status: ContractStatus,
    pub sent_at: DateTime<Utc>,
    pub signed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// Amount in minor currency units (pence, cents)
    pub amount_minor: i64,
    pub status: InvoiceStatus,
    pub sent_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("Invalid id {}: {}", raw, e)))
}

fn contract_from_row(row: &SqliteRow) -> Result<Contract> {
    let id: String = row.try_get("id")?;
    let booking_id: String = row.try_get("booking_id")?;
    let status: String = row.try_get("status")?;
    Ok(Contract {
        id: parse_uuid(&id)?,
        booking_id: parse_uuid(&booking_id)?,
        status: match status.as_str() {
            "signed" => ContractStatus::Signed,
            _ => ContractStatus::Sent,
        },
        sent_at: row.try_get("sent_at")?,
        signed_at: row.try_get("signed_at")?,
    })
}

fn invoice_from_row(row: &SqliteRow) -> Result<Invoice> {
    let id: String = row.try_get("id")?;
    let booking_id: String = row.try_get("booking_id")?;
    let status: String = row.try_get("status")?;
    Ok(Invoice {
        id: parse_uuid(&id)?,
        booking_id: parse_uuid(&booking_id)?,
        amount_minor: row.try_get("amount_minor")?,
        status: match status.as_str() {
            "paid" => InvoiceStatus::Paid,
            _ => InvoiceStatus::Sent,
        },
        sent_at: row.try_get("sent_at")?,
        paid_at: row.try_get("paid_at")?,
    })
}

/// Record that a contract went out for a booking
pub async fn insert_contract<'e, E: SqliteExecutor<'e>>(executor: E, booking_id: Uuid) -> Result<Contract> {
    let contract = Contract {
        id: Uuid::new_v4(),
        booking_id,
        status: ContractStatus::Sent,
        sent_at: Utc::now(),
        signed_at: None,
    };
    sqlx::query("INSERT INTO contracts (id, booking_id, status, sent_at) VALUES (?, ?, 'sent', ?)")
        .bind(contract.id.to_string())
        .bind(booking_id.to_string())
        .bind(contract.sent_at)
        .execute(executor)
        .await?;
    Ok(contract)
}

pub async fn list_contracts<'e, E: SqliteExecutor<'e>>(executor: E, booking_id: Uuid) -> Result<Vec<Contract>> {
    let rows = sqlx::query(
        "SELECT id, booking_id, status, sent_at, signed_at FROM contracts WHERE booking_id = ? ORDER BY sent_at, id",
    )
    .bind(booking_id.to_string())
    .fetch_all(executor)
    .await?;
    rows.iter().map(contract_from_row).collect()
}

/// Mark the most recently sent, unsigned contract as signed
pub async fn sign_latest_contract<'e, E: SqliteExecutor<'e>>(executor: E, booking_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE contracts SET status = 'signed', signed_at = ?
        WHERE id = (
            SELECT id FROM contracts
            WHERE booking_id = ? AND status = 'sent'
            ORDER BY sent_at DESC, id DESC
            LIMIT 1
        )
        "#,
    )
    .bind(Utc::now())
    .bind(booking_id.to_string())
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn insert_invoice<'e, E: SqliteExecutor<'e>>(
    executor: E,
    booking_id: Uuid,
    amount_minor: i64,
) -> Result<Invoice> {
    if amount_minor < 0 {
        return Err(Error::InvalidInput("Invoice amount must not be negative".to_string()));
    }
    let invoice = Invoice {
        id: Uuid::new_v4(),
        booking_id,
        amount_minor,
        status: InvoiceStatus::Sent,
        sent_at: Utc::now(),
        paid_at: None,
    };
    sqlx::query(
        "INSERT INTO invoices (id, booking_id, amount_minor, status, sent_at) VALUES (?, ?, ?, 'sent', ?)",
    )
    .bind(invoice.id.to_string())
    .bind(booking_id.to_string())
    .bind(amount_minor)
    .bind(invoice.sent_at)
    .execute(executor)
    .await?;
    Ok(invoice)
}

pub async fn list_invoices<'e, E: SqliteExecutor<'e>>(executor: E, booking_id: Uuid) -> Result<Vec<Invoice>> {
    let rows = sqlx::query(
        "SELECT id, booking_id, amount_minor, status, sent_at, paid_at FROM invoices WHERE booking_id = ? ORDER BY sent_at, id",
    )
    .bind(booking_id.to_string())
    .fetch_all(executor)
    .await?;
    rows.iter().map(invoice_from_row).collect()
}

/// Mark one of the booking's invoices paid; false if it is unknown or already paid
pub async fn mark_invoice_paid<'e, E: SqliteExecutor<'e>>(
    executor: E,
    booking_id: Uuid,
    invoice_id: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE invoices SET status = 'paid', paid_at = ? WHERE id = ? AND booking_id = ? AND status = 'sent'",
    )
    .bind(Utc::now())
    .bind(invoice_id.to_string())
    .bind(booking_id.to_string())
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}
