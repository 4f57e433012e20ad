//! The `migrations` table: one row per applied unit.
//!
//! Rows are only ever inserted by the runner, inside the transaction that
//! applies the unit they record.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, params};

use super::MigrationError;

pub const LEDGER_TABLE: &str = "migrations";

/// A recorded, applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Create the ledger table if it does not exist yet.
pub fn ensure(conn: &Connection) -> Result<(), MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );",
    )
    .map_err(|e| MigrationError::database("failed to create migrations table", e))
}

/// Names of applied units in insertion order.
pub fn applied_names(conn: &Connection) -> Result<Vec<String>, MigrationError> {
    let mut stmt = conn
        .prepare("SELECT name FROM migrations ORDER BY id")
        .map_err(|e| MigrationError::database("failed to prepare ledger query", e))?;

    let rows = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| MigrationError::database("failed to query ledger", e))?;

    rows.collect::<rusqlite::Result<Vec<String>>>()
        .map_err(|e| MigrationError::database("failed to read ledger row", e))
}

/// Full ledger rows in insertion order.
pub fn entries(conn: &Connection) -> Result<Vec<LedgerEntry>, MigrationError> {
    let mut stmt = conn
        .prepare("SELECT id, name, applied_at FROM migrations ORDER BY id")
        .map_err(|e| MigrationError::database("failed to prepare ledger query", e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(LedgerEntry {
                id: row.get(0)?,
                name: row.get(1)?,
                applied_at: parse_datetime(row.get::<_, Option<String>>(2)?),
            })
        })
        .map_err(|e| MigrationError::database("failed to query ledger", e))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| MigrationError::database("failed to read ledger row", e))
}

/// Insert the ledger row for `name`. Must run in the unit's transaction.
///
/// A uniqueness violation here means the unit was applied twice; the caller
/// rolls the whole transaction back.
pub fn record_applied(tx: &Transaction<'_>, name: &str) -> rusqlite::Result<()> {
    tx.execute("INSERT INTO migrations (name) VALUES (?1)", params![name])?;
    Ok(())
}

pub(crate) fn parse_datetime(s: Option<String>) -> DateTime<Utc> {
    let Some(s) = s else {
        return DateTime::<Utc>::UNIX_EPOCH;
    };
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // CURRENT_TIMESTAMP produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        })
}
