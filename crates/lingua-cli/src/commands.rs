use anyhow::{Context, Result};
use lingua_config::AppConfig;
use lingua_db::migrate::lock;
use lingua_db::{
    Database, DirectorySource, Generator, MigrateOptions, MigrationSource, Migrator, UnitState,
    portal,
};

pub fn create(config: &AppConfig, slug: &str) -> Result<()> {
    let created = Generator::new(&config.migrations.dir)
        .create(slug)
        .context("failed to create migration")?;

    println!("Created migration: {}", created.path.display());
    Ok(())
}

pub fn run(config: &AppConfig, embedded: bool, lock: bool) -> Result<()> {
    let db = Database::open(&config.database.path)?;
    let options = MigrateOptions {
        lock: lock || config.migrations.lock,
    };

    println!("Running migrations...");
    let report = if embedded {
        db.migrate(&Migrator::new(portal::registry()?).with_options(options))?
    } else {
        let source = DirectorySource::new(&config.migrations.dir);
        db.migrate(&Migrator::new(source).with_options(options))?
    };

    match report.count() {
        0 => println!("No pending migrations to apply"),
        1 => println!("1 migration applied"),
        n => println!("{n} migrations applied"),
    }
    Ok(())
}

pub fn status(config: &AppConfig, embedded: bool) -> Result<()> {
    let db = Database::open(&config.database.path)?;
    if embedded {
        print_status(&db, &Migrator::new(portal::registry()?))
    } else {
        print_status(
            &db,
            &Migrator::new(DirectorySource::new(&config.migrations.dir)),
        )
    }
}

fn print_status<S: MigrationSource>(db: &Database, migrator: &Migrator<S>) -> Result<()> {
    let conn = db.connection()?;
    let statuses = migrator.status(&conn)?;
    if statuses.is_empty() {
        println!("No migrations found");
        return Ok(());
    }

    let mut pending = 0;
    for status in &statuses {
        match &status.state {
            UnitState::Applied(entry) => println!(
                "  applied   {}  ({})",
                status.name,
                entry.applied_at.format("%Y-%m-%d %H:%M:%S")
            ),
            UnitState::Pending => {
                pending += 1;
                println!("  pending   {}", status.name);
            }
            UnitState::Orphaned(entry) => println!(
                "  orphaned  {}  ({}, no longer in source)",
                status.name,
                entry.applied_at.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
    println!();
    println!("{pending} pending");
    Ok(())
}

pub fn unlock(config: &AppConfig) -> Result<()> {
    let db = Database::open(&config.database.path)?;
    let conn = db.connection()?;
    if lock::force_unlock(&conn)? {
        println!("Migration lock removed");
    } else {
        println!("No migration lock held");
    }
    Ok(())
}
