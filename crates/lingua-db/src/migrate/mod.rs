//! Versioned schema migrations.
//!
//! A migration unit is a named pair of forward/backward procedures. Unit
//! names are `<sortable-prefix>_<slug>` and the prefix is the only ordering
//! key. A [`MigrationSource`] discovers units, the ledger table records
//! which ones have been applied, and the [`Migrator`] applies the pending
//! ones in order, each inside its own transaction together with its ledger
//! row.

mod error;
pub mod generator;
pub mod ledger;
pub mod lock;
pub mod registry;
pub mod runner;
pub mod source;
pub mod unit;

pub use error::MigrationError;
pub use generator::{CreatedUnit, Generator};
pub use ledger::LedgerEntry;
pub use registry::{RegisteredUnit, Registry};
pub use runner::{MigrateOptions, Migrator, RunReport, UnitState, UnitStatus};
pub use source::{DirectorySource, MigrationSource};
pub use unit::{MigrationUnit, Procedure, Step, UnitName};
