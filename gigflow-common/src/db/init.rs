//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates every table
//! idempotently. Safe to run on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path, triage_user_id: &str) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    seed_triage_user(&pool, triage_user_id).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Limited to one connection: every SQLite connection to `:memory:` gets its
/// own database.
pub async fn init_memory_database(triage_user_id: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;
    seed_triage_user(&pool, triage_user_id).await?;
    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_users_table(pool).await?;
    create_bookings_table(pool).await?;
    create_raw_payloads_table(pool).await?;
    create_contracts_table(pool).await?;
    create_invoices_table(pool).await?;
    create_conflict_resolutions_table(pool).await?;

    info!("Database tables initialized");
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            routing_prefix TEXT UNIQUE COLLATE NOCASE,
            is_triage INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Bookings unify enquiries and confirmed engagements
///
/// `event_date` must be a real calendar date or NULL; the CHECK rejects text
/// that SQLite's date() would normalize differently (e.g. 2025-02-30).
async fn create_bookings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            title TEXT NOT NULL,
            client_name TEXT NOT NULL,
            client_email TEXT,
            client_phone TEXT,
            event_date TEXT CHECK (event_date IS NULL OR date(event_date) IS event_date),
            event_time TEXT,
            event_end_time TEXT,
            venue TEXT,
            venue_address TEXT,
            event_type TEXT,
            gig_type TEXT,
            estimated_value TEXT,
            status TEXT NOT NULL DEFAULT 'enquiry'
                CHECK (status IN ('enquiry', 'negotiation', 'confirmed', 'completed', 'cancelled')),
            notes TEXT,
            response_needed INTEGER NOT NULL DEFAULT 0,
            parse_confidence REAL,
            parse_method TEXT,
            source_message_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, source_message_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_bookings_user_date ON bookings(user_id, event_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Raw webhook payloads with the reference date used to parse them
async fn create_raw_payloads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_payloads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id),
            source_message_id TEXT NOT NULL,
            reference_date TEXT NOT NULL,
            payload TEXT NOT NULL,
            received_at TEXT NOT NULL,
            UNIQUE (user_id, source_message_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_contracts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contracts (
            id TEXT PRIMARY KEY,
            booking_id TEXT NOT NULL REFERENCES bookings(id),
            status TEXT NOT NULL CHECK (status IN ('sent', 'signed')),
            sent_at TEXT NOT NULL,
            signed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_invoices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY,
            booking_id TEXT NOT NULL REFERENCES bookings(id),
            amount_minor INTEGER NOT NULL CHECK (amount_minor >= 0),
            status TEXT NOT NULL CHECK (status IN ('sent', 'paid')),
            sent_at TEXT NOT NULL,
            paid_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_conflict_resolutions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conflict_resolutions (
            booking_id TEXT NOT NULL,
            other_booking_id TEXT NOT NULL,
            resolved_at TEXT NOT NULL,
            PRIMARY KEY (booking_id, other_booking_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure the account receiving unrouted mail exists
pub async fn seed_triage_user(pool: &SqlitePool, triage_user_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO users (id, name, routing_prefix, is_triage)
        VALUES (?, 'Triage', NULL, 1)
        "#,
    )
    .bind(triage_user_id)
    .execute(pool)
    .await?;

    Ok(())
}
