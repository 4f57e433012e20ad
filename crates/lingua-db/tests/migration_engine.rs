use std::fs;
use std::path::Path;

use lingua_db::migrate::ledger;
use lingua_db::{DirectorySource, Generator, MigrationError, MigrationSource, Migrator};
use rusqlite::Connection;

fn write_unit(dir: &Path, name: &str, up: &str, down: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join(format!("{name}.sql")),
        format!("-- migrate:up\n{up}\n\n-- migrate:down\n{down}\n"),
    )
    .unwrap();
}

fn words_and_groups(dir: &Path) {
    write_unit(
        dir,
        "20250301_create_words",
        "CREATE TABLE words (id INTEGER PRIMARY KEY AUTOINCREMENT, italian TEXT NOT NULL, english TEXT NOT NULL);",
        "DROP TABLE words;",
    );
    write_unit(
        dir,
        "20250302_create_groups",
        "CREATE TABLE groups (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);",
        "DROP TABLE groups;",
    );
}

fn open(path: &Path) -> Connection {
    Connection::open(path).unwrap()
}

fn ledger_rows(conn: &Connection) -> Vec<(i64, String)> {
    ledger::entries(conn)
        .unwrap()
        .into_iter()
        .map(|e| (e.id, e.name))
        .collect()
}

fn object_exists(conn: &Connection, kind: &str, name: &str) -> bool {
    conn.query_row(
        "SELECT count(*) > 0 FROM sqlite_master WHERE type = ?1 AND name = ?2",
        [kind, name],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn scenario_a_applies_everything_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    words_and_groups(&dir);

    let mut conn = open(&tmp.path().join("portal.db"));
    let report = Migrator::new(DirectorySource::new(&dir))
        .run(&mut conn)
        .unwrap();

    assert_eq!(
        report.applied,
        vec!["20250301_create_words", "20250302_create_groups"]
    );
    let rows = ledger_rows(&conn);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1, "20250301_create_words");
    assert_eq!(rows[1].1, "20250302_create_groups");
    // order preservation: earlier unit, smaller id
    assert!(rows[0].0 < rows[1].0);
}

#[test]
fn scenario_b_applies_only_the_missing_unit() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    words_and_groups(&dir);

    let mut conn = open(&tmp.path().join("portal.db"));
    conn.execute_batch(
        "CREATE TABLE words (id INTEGER PRIMARY KEY AUTOINCREMENT, italian TEXT NOT NULL, english TEXT NOT NULL);",
    )
    .unwrap();
    ledger::ensure(&conn).unwrap();
    let tx = conn.transaction().unwrap();
    ledger::record_applied(&tx, "20250301_create_words").unwrap();
    tx.commit().unwrap();

    let report = Migrator::new(DirectorySource::new(&dir))
        .run(&mut conn)
        .unwrap();
    assert_eq!(report.count(), 1);
    assert_eq!(report.applied, vec!["20250302_create_groups"]);
}

#[test]
fn scenario_c_failing_unit_leaves_ledger_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    words_and_groups(&dir);

    let db_path = tmp.path().join("portal.db");
    let mut conn = open(&db_path);
    let migrator = Migrator::new(DirectorySource::new(&dir));
    migrator.run(&mut conn).unwrap();
    let before = ledger_rows(&conn);

    write_unit(
        &dir,
        "20250307_fix_word_review_items",
        "CREATE TABLE word_review_items (id INTEGER PRIMARY KEY, word_id INTEGER NOT NULL);\nDROP INDEX idx_word_review_items_word_id;",
        "DROP TABLE IF EXISTS word_review_items;",
    );
    write_unit(
        &dir,
        "20250308_create_study_sessions",
        "CREATE TABLE study_sessions (id INTEGER PRIMARY KEY);",
        "DROP TABLE study_sessions;",
    );

    let err = migrator.run(&mut conn).unwrap_err();
    assert!(matches!(err, MigrationError::Transformation { .. }));
    assert_eq!(err.unit_name(), Some("20250307_fix_word_review_items"));
    assert!(err.to_string().contains("20250307_fix_word_review_items"));

    // Reopen to make sure nothing half-committed reached the file.
    drop(conn);
    let conn = open(&db_path);
    assert_eq!(ledger_rows(&conn), before);
    assert!(!object_exists(&conn, "table", "word_review_items"));
    assert!(!object_exists(&conn, "table", "study_sessions"));
}

#[test]
fn fixing_a_failed_unit_lets_the_next_run_continue() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    words_and_groups(&dir);
    write_unit(
        &dir,
        "20250303_broken",
        "DROP INDEX idx_missing;",
        "",
    );

    let mut conn = open(&tmp.path().join("portal.db"));
    let migrator = Migrator::new(DirectorySource::new(&dir));
    assert!(migrator.run(&mut conn).is_err());
    assert_eq!(ledger_rows(&conn).len(), 2);

    write_unit(
        &dir,
        "20250303_broken",
        "CREATE INDEX idx_words_italian ON words(italian);",
        "DROP INDEX idx_words_italian;",
    );
    let report = migrator.run(&mut conn).unwrap();
    assert_eq!(report.applied, vec!["20250303_broken"]);
    assert!(object_exists(&conn, "index", "idx_words_italian"));
}

#[test]
fn scenario_d_same_tick_creates_are_distinct_and_discoverable() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    let generator = Generator::new(&dir);

    let first = generator.create("add_audit_log").unwrap();
    let second = generator.create("add_audit_log").unwrap();
    assert_ne!(first.name, second.name);
    assert!(first.name < second.name);

    let source = DirectorySource::new(&dir);
    assert_eq!(
        source.discover().unwrap(),
        vec![first.name.clone(), second.name.clone()]
    );
    source.load(&first.name).unwrap();
    source.load(&second.name).unwrap();

    // empty skeletons apply as no-ops and are recorded
    let mut conn = Connection::open_in_memory().unwrap();
    let report = Migrator::new(source).run(&mut conn).unwrap();
    assert_eq!(report.applied, vec![first.name, second.name]);
}

#[test]
fn p1_second_run_applies_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    words_and_groups(&dir);

    let mut conn = open(&tmp.path().join("portal.db"));
    let migrator = Migrator::new(DirectorySource::new(&dir));
    migrator.run(&mut conn).unwrap();
    let before = ledger_rows(&conn);

    assert!(migrator.run(&mut conn).unwrap().is_noop());
    assert_eq!(ledger_rows(&conn), before);
}

#[test]
fn p2_names_are_recorded_at_most_once() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    words_and_groups(&dir);

    let mut conn = open(&tmp.path().join("portal.db"));
    let migrator = Migrator::new(DirectorySource::new(&dir));
    for _ in 0..3 {
        migrator.run(&mut conn).unwrap();
    }

    let duplicates: i64 = conn
        .query_row(
            "SELECT count(*) FROM (SELECT name FROM migrations GROUP BY name HAVING count(*) > 1)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(duplicates, 0);
    assert_eq!(ledger_rows(&conn).len(), 2);
}

#[test]
fn p5_discovery_creates_an_empty_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("db").join("migrations");
    assert!(!dir.exists());

    let mut conn = Connection::open_in_memory().unwrap();
    let report = Migrator::new(DirectorySource::new(&dir))
        .run(&mut conn)
        .unwrap();

    assert!(report.is_noop());
    assert!(dir.is_dir());
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
}

#[test]
fn malformed_unit_stops_the_run_before_any_transaction() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    words_and_groups(&dir);
    fs::write(dir.join("20250301T000000_no_markers.sql"), "CREATE TABLE x (id INTEGER);").unwrap();

    let mut conn = Connection::open_in_memory().unwrap();
    let err = Migrator::new(DirectorySource::new(&dir))
        .run(&mut conn)
        .unwrap_err();

    assert!(matches!(err, MigrationError::Load { .. }));
    assert_eq!(err.unit_name(), Some("20250301T000000_no_markers"));
    assert!(ledger_rows(&conn).is_empty());
    assert!(!object_exists(&conn, "table", "x"));
}
