//! The language portal's schema, compiled in as a migration registry.

mod units;

use std::path::Path;

use lingua_common::Result;
use tracing::info;

use crate::database::Database;
use crate::migrate::{MigrateOptions, MigrationError, Migrator, Registry};

pub use units::UNITS;

/// Registry of every portal schema unit.
pub fn registry() -> std::result::Result<Registry, MigrationError> {
    Registry::new(UNITS)
}

/// Open the portal database and bring its schema up to date.
///
/// This is the startup path: a migration failure is returned as an error and
/// the caller must not serve from the database.
pub fn open(db_path: &Path, options: MigrateOptions) -> Result<Database> {
    let db = Database::open(db_path)?;
    let migrator = Migrator::new(registry()?).with_options(options);
    let report = db.migrate(&migrator)?;
    if !report.is_noop() {
        info!("portal schema migrated ({} unit(s))", report.count());
    }
    Ok(db)
}
