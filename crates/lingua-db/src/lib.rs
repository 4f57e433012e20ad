pub mod database;
pub mod migrate;
pub mod portal;

pub use database::Database;
pub use migrate::{
    DirectorySource, Generator, MigrateOptions, MigrationError, MigrationSource, MigrationUnit,
    Migrator, Procedure, RegisteredUnit, Registry, RunReport, UnitState, UnitStatus,
};
