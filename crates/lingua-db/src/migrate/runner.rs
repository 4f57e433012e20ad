use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, Transaction};
use tracing::{error, info, warn};

use super::source::MigrationSource;
use super::unit::MigrationUnit;
use super::{MigrationError, ledger, lock};

#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Hold the `migrations_lock` lease for the duration of a run.
    pub lock: bool,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Units applied by this run, in application order.
    pub applied: Vec<String>,
}

impl RunReport {
    pub fn count(&self) -> usize {
        self.applied.len()
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    Applied(ledger::LedgerEntry),
    Pending,
    /// Recorded in the ledger but no longer provided by the source.
    Orphaned(ledger::LedgerEntry),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: String,
    pub state: UnitState,
}

/// Brings a database up to date with every unit its source provides.
///
/// Units are applied one at a time in discovery order. Each one runs in its
/// own transaction together with its ledger row; the first failure rolls
/// that transaction back and ends the run.
pub struct Migrator<S> {
    source: S,
    options: MigrateOptions,
}

impl<S: MigrationSource> Migrator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            options: MigrateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MigrateOptions) -> Self {
        self.options = options;
        self
    }

    /// Apply all pending units.
    pub fn run(&self, conn: &mut Connection) -> Result<RunReport, MigrationError> {
        ledger::ensure(conn)?;

        if !self.options.lock {
            return self.apply_pending(conn);
        }

        let holder = lock::acquire(conn)?;
        let result = self.apply_pending(conn);
        if let Err(e) = lock::release(conn, &holder) {
            warn!("{e}; clear it with `lingua unlock`");
        }
        result
    }

    /// Units the source provides that the ledger does not record, in
    /// discovery order.
    pub fn pending(&self, conn: &Connection) -> Result<Vec<String>, MigrationError> {
        ledger::ensure(conn)?;
        let applied: HashSet<String> = ledger::applied_names(conn)?.into_iter().collect();
        let available = self.source.discover()?;

        let orphaned = applied
            .iter()
            .filter(|name| !available.contains(name))
            .count();
        if orphaned > 0 {
            warn!("{orphaned} applied migration(s) are no longer provided by the source");
        }

        Ok(available
            .into_iter()
            .filter(|name| !applied.contains(name))
            .collect())
    }

    /// Every known unit with its ledger state. Orphaned ledger rows are
    /// listed last, in ledger order.
    pub fn status(&self, conn: &Connection) -> Result<Vec<UnitStatus>, MigrationError> {
        ledger::ensure(conn)?;
        let entries = ledger::entries(conn)?;
        let available = self.source.discover()?;

        let mut by_name: HashMap<&str, &ledger::LedgerEntry> =
            entries.iter().map(|e| (e.name.as_str(), e)).collect();

        let mut statuses: Vec<UnitStatus> = available
            .iter()
            .map(|name| {
                let state = match by_name.remove(name.as_str()) {
                    Some(entry) => UnitState::Applied(entry.clone()),
                    None => UnitState::Pending,
                };
                UnitStatus {
                    name: name.clone(),
                    state,
                }
            })
            .collect();

        statuses.extend(
            entries
                .iter()
                .filter(|e| by_name.contains_key(e.name.as_str()))
                .map(|e| UnitStatus {
                    name: e.name.clone(),
                    state: UnitState::Orphaned(e.clone()),
                }),
        );

        Ok(statuses)
    }

    fn apply_pending(&self, conn: &mut Connection) -> Result<RunReport, MigrationError> {
        let pending = self.pending(conn)?;
        if pending.is_empty() {
            info!("no pending migrations to apply");
            return Ok(RunReport::default());
        }

        info!("found {} pending migration(s)", pending.len());

        let mut report = RunReport::default();
        for name in pending {
            let unit = self.source.load(&name).inspect_err(|e| error!("{e}"))?;
            apply_unit(conn, &unit).inspect_err(|e| error!("{e}"))?;
            report.applied.push(name);
        }

        info!("applied {} migration(s)", report.count());
        Ok(report)
    }
}

/// Begin, run forward, record, commit. Any failure rolls back.
fn apply_unit(conn: &mut Connection, unit: &MigrationUnit) -> Result<(), MigrationError> {
    let name = unit.name.as_str();
    info!("applying migration: {name}");

    let tx = conn
        .transaction()
        .map_err(|e| MigrationError::database("failed to begin transaction", e))?;

    if let Err(e) = unit.forward.apply(&tx) {
        rollback(tx, name);
        return Err(MigrationError::Transformation {
            name: name.to_string(),
            reason: e.to_string(),
        });
    }

    // A unit that issued its own COMMIT or ROLLBACK has broken atomicity and
    // the ledger row can no longer go in with it.
    if tx.is_autocommit() {
        return Err(MigrationError::Transformation {
            name: name.to_string(),
            reason: "unit ended the enclosing transaction itself".into(),
        });
    }

    if let Err(e) = ledger::record_applied(&tx, name) {
        rollback(tx, name);
        return Err(MigrationError::LedgerWrite {
            name: name.to_string(),
            reason: e.to_string(),
        });
    }

    // A failed commit drops the transaction, which rolls it back.
    tx.commit().map_err(|e| MigrationError::LedgerWrite {
        name: name.to_string(),
        reason: format!("commit failed: {e}"),
    })?;

    info!("migration applied: {name}");
    Ok(())
}

fn rollback(tx: Transaction<'_>, name: &str) {
    if let Err(e) = tx.rollback() {
        warn!("rollback of {name} failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::{Procedure, RegisteredUnit, Registry};
    use std::borrow::Cow;

    const fn unit(name: &'static str, forward: &'static str) -> RegisteredUnit {
        RegisteredUnit {
            name,
            forward: Procedure::Sql(Cow::Borrowed(forward)),
            backward: Procedure::Sql(Cow::Borrowed("")),
        }
    }

    fn words() -> RegisteredUnit {
        unit(
            "20250301_create_words",
            "CREATE TABLE words (id INTEGER PRIMARY KEY, italian TEXT NOT NULL);",
        )
    }

    fn groups() -> RegisteredUnit {
        unit(
            "20250302_create_groups",
            "CREATE TABLE groups (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
        )
    }

    fn migrator(units: &[RegisteredUnit]) -> Migrator<Registry> {
        Migrator::new(Registry::new(units).unwrap())
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT count(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn applies_everything_on_empty_ledger() {
        let mut conn = Connection::open_in_memory().unwrap();
        let report = migrator(&[groups(), words()]).run(&mut conn).unwrap();

        assert_eq!(
            report.applied,
            vec!["20250301_create_words", "20250302_create_groups"]
        );
        assert!(table_exists(&conn, "words"));
        assert!(table_exists(&conn, "groups"));
    }

    #[test]
    fn second_run_is_a_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        let m = migrator(&[words(), groups()]);
        m.run(&mut conn).unwrap();
        let before = ledger::entries(&conn).unwrap();

        let report = m.run(&mut conn).unwrap();
        assert!(report.is_noop());
        assert_eq!(ledger::entries(&conn).unwrap(), before);
    }

    #[test]
    fn pending_preserves_discovery_order() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrator(&[words()]).run(&mut conn).unwrap();

        let m = migrator(&[
            unit("20250303_c", ""),
            groups(),
            words(),
            unit("20250301T000000_a", ""),
        ]);
        assert_eq!(
            m.pending(&conn).unwrap(),
            vec!["20250301T000000_a", "20250302_create_groups", "20250303_c"]
        );
    }

    #[test]
    fn failure_rolls_back_and_halts() {
        let mut conn = Connection::open_in_memory().unwrap();
        let m = migrator(&[
            words(),
            unit(
                "20250302_broken",
                "CREATE TABLE partial (id INTEGER); DROP INDEX idx_does_not_exist;",
            ),
            groups(),
        ]);

        let err = m.run(&mut conn).unwrap_err();
        assert!(matches!(err, MigrationError::Transformation { .. }));
        assert_eq!(err.unit_name(), Some("20250302_broken"));

        assert_eq!(
            ledger::applied_names(&conn).unwrap(),
            vec!["20250301_create_words"]
        );
        assert!(!table_exists(&conn, "partial"));
        // 20250302_create_groups sorts after the broken unit
        assert!(!table_exists(&conn, "groups"));
    }

    #[test]
    fn unit_that_commits_itself_is_reported() {
        let mut conn = Connection::open_in_memory().unwrap();
        let m = migrator(&[unit(
            "20250301_sneaky",
            "CREATE TABLE sneaky (id INTEGER); COMMIT;",
        )]);

        let err = m.run(&mut conn).unwrap_err();
        assert!(err.to_string().contains("ended the enclosing transaction"));
        assert!(ledger::applied_names(&conn).unwrap().is_empty());
    }

    #[test]
    fn ledger_conflict_rolls_back_the_schema_change() {
        fn record_early(tx: &Transaction<'_>) -> rusqlite::Result<()> {
            tx.execute_batch("CREATE TABLE early (id INTEGER);")?;
            ledger::record_applied(tx, "20250301_early")
        }

        let mut conn = Connection::open_in_memory().unwrap();
        let m = migrator(&[RegisteredUnit {
            name: "20250301_early",
            forward: Procedure::Native(record_early),
            backward: Procedure::Sql(Cow::Borrowed("")),
        }]);

        let err = m.run(&mut conn).unwrap_err();
        assert!(matches!(err, MigrationError::LedgerWrite { .. }));
        assert!(!table_exists(&conn, "early"));
        assert!(ledger::applied_names(&conn).unwrap().is_empty());
    }

    #[test]
    fn status_reports_applied_pending_and_orphaned() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrator(&[unit("20250228_gone", "CREATE TABLE gone (id INTEGER);"), words()])
            .run(&mut conn)
            .unwrap();

        let statuses = migrator(&[words(), groups()]).status(&conn).unwrap();
        let summary: Vec<(&str, &str)> = statuses
            .iter()
            .map(|s| {
                let state = match s.state {
                    UnitState::Applied(_) => "applied",
                    UnitState::Pending => "pending",
                    UnitState::Orphaned(_) => "orphaned",
                };
                (s.name.as_str(), state)
            })
            .collect();

        assert_eq!(
            summary,
            vec![
                ("20250301_create_words", "applied"),
                ("20250302_create_groups", "pending"),
                ("20250228_gone", "orphaned"),
            ]
        );
    }

    #[test]
    fn locked_run_refuses_to_start_and_releases_after() {
        let mut conn = Connection::open_in_memory().unwrap();
        let m = migrator(&[words()]).with_options(MigrateOptions { lock: true });

        let holder = lock::acquire(&conn).unwrap();
        let err = m.run(&mut conn).unwrap_err();
        assert!(matches!(err, MigrationError::Locked { .. }));
        assert!(ledger::applied_names(&conn).unwrap().is_empty());

        lock::release(&conn, &holder).unwrap();
        assert_eq!(m.run(&mut conn).unwrap().count(), 1);
        assert!(lock::current_holder(&conn).unwrap().is_none());
    }
}
