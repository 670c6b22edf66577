//! Musician accounts and recipient routing

use gigflow_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteExecutor};

/// Account that owns bookings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    /// Suffix in `leads+<prefix>@domain` that routes mail to this user
    pub routing_prefix: Option<String>,
    pub is_triage: bool,
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        routing_prefix: row.try_get("routing_prefix")?,
        is_triage: row.try_get("is_triage")?,
    })
}

pub async fn get_user<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, routing_prefix, is_triage FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

/// Case-insensitive lookup by routing prefix
pub async fn find_by_routing_prefix<'e, E: SqliteExecutor<'e>>(
    executor: E,
    prefix: &str,
) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, name, routing_prefix, is_triage FROM users WHERE routing_prefix = ? COLLATE NOCASE",
    )
    .bind(prefix)
    .fetch_optional(executor)
    .await?;
    row.as_ref().map(user_from_row).transpose()
}

/// Register a user; a taken id or routing prefix is rejected
pub async fn create_user<'e, E: SqliteExecutor<'e>>(executor: E, user: &User) -> Result<()> {
    let result = sqlx::query(
        "INSERT INTO users (id, name, routing_prefix, is_triage) VALUES (?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.routing_prefix)
    .bind(user.is_triage)
    .execute(executor)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
            Error::InvalidInput(format!("User id or routing prefix already in use: {}", user.id)),
        ),
        Err(e) => Err(e.into()),
    }
}
