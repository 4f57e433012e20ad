//! Single-row lease guarding a migration run.
//!
//! Opt-in: two runners against the same database race on the pending set
//! otherwise. A crashed runner leaves its row behind; [`force_unlock`]
//! clears it.

use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tracing::{info, warn};
use uuid::Uuid;

use super::MigrationError;

fn ensure(conn: &Connection) -> Result<(), MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations_lock (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            holder TEXT NOT NULL,
            acquired_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );",
    )
    .map_err(|e| MigrationError::database("failed to create migrations_lock table", e))
}

/// Take the lease. Returns the holder id to pass to [`release`].
pub fn acquire(conn: &Connection) -> Result<String, MigrationError> {
    ensure(conn)?;
    let holder = format!("pid-{}-{}", std::process::id(), Uuid::new_v4());

    match conn.execute(
        "INSERT INTO migrations_lock (id, holder) VALUES (1, ?1)",
        params![holder],
    ) {
        Ok(_) => {
            info!("acquired migration lock as {holder}");
            Ok(holder)
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            let (holder, since) = current_holder(conn)?.unwrap_or_default();
            Err(MigrationError::Locked { holder, since })
        }
        Err(e) => Err(MigrationError::database("failed to acquire migration lock", e)),
    }
}

/// Drop the lease if `holder` still owns it.
pub fn release(conn: &Connection, holder: &str) -> Result<(), MigrationError> {
    let removed = conn
        .execute(
            "DELETE FROM migrations_lock WHERE id = 1 AND holder = ?1",
            params![holder],
        )
        .map_err(|e| MigrationError::database("failed to release migration lock", e))?;

    if removed == 0 {
        warn!("migration lock held by {holder} was already gone");
    }
    Ok(())
}

/// Remove any lease regardless of holder. Returns whether one existed.
pub fn force_unlock(conn: &Connection) -> Result<bool, MigrationError> {
    ensure(conn)?;
    if let Some((holder, since)) = current_holder(conn)? {
        warn!("removing migration lock held by {holder} since {since}");
    }
    let removed = conn
        .execute("DELETE FROM migrations_lock", [])
        .map_err(|e| MigrationError::database("failed to clear migration lock", e))?;
    Ok(removed > 0)
}

/// `(holder, acquired_at)` of the current lease, if any.
pub fn current_holder(conn: &Connection) -> Result<Option<(String, String)>, MigrationError> {
    ensure(conn)?;
    conn.query_row(
        "SELECT holder, COALESCE(acquired_at, '') FROM migrations_lock WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(|e| MigrationError::database("failed to read migration lock", e))
}
