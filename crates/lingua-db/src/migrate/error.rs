use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("cannot read migrations at {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot load migration {name}: {reason}")]
    Load { name: String, reason: String },

    #[error("migration {name} failed: {reason}")]
    Transformation { name: String, reason: String },

    #[error("failed to record migration {name}: {reason}")]
    LedgerWrite { name: String, reason: String },

    #[error("{context}: {source}")]
    Database {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot create migration: {0}")]
    Generator(String),

    #[error("cannot write migration {}: {source}", .path.display())]
    GeneratorIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("migrations are locked by {holder} since {since}")]
    Locked { holder: String, since: String },

    #[error("duplicate migration name: {0}")]
    DuplicateUnit(String),
}

impl MigrationError {
    pub(crate) fn database(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Database {
            context: context.into(),
            source,
        }
    }

    /// Name of the unit the error is attributed to, if any.
    pub fn unit_name(&self) -> Option<&str> {
        match self {
            Self::Load { name, .. }
            | Self::Transformation { name, .. }
            | Self::LedgerWrite { name, .. } => Some(name),
            Self::DuplicateUnit(name) => Some(name),
            _ => None,
        }
    }
}

impl From<MigrationError> for lingua_common::Error {
    fn from(e: MigrationError) -> Self {
        match e {
            MigrationError::Database { .. } => lingua_common::Error::Database(e.to_string()),
            other => lingua_common::Error::Migration(other.to_string()),
        }
    }
}
