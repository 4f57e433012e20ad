use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::Transaction;

use super::MigrationError;

static UNIT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>[0-9]{8}(?:T[0-9]{6})?)_(?P<slug>[a-z0-9_]+)$")
        .expect("unit name pattern is valid")
});

/// A native migration step. It receives the open transaction and must not
/// try to finish it; the runner commits or rolls back.
pub type Step = fn(&Transaction<'_>) -> rusqlite::Result<()>;

/// One direction of a migration unit.
#[derive(Clone)]
pub enum Procedure {
    /// A batch of SQL statements executed in the open transaction.
    Sql(Cow<'static, str>),
    Native(Step),
}

impl Procedure {
    pub fn apply(&self, tx: &Transaction<'_>) -> rusqlite::Result<()> {
        match self {
            Procedure::Sql(sql) if sql.trim().is_empty() => Ok(()),
            Procedure::Sql(sql) => tx.execute_batch(sql),
            Procedure::Native(step) => step(tx),
        }
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            Procedure::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// A loaded migration: its name plus both procedures.
///
/// `backward` is carried for manual recovery; the runner only ever applies
/// `forward`.
#[derive(Debug, Clone)]
pub struct MigrationUnit {
    pub name: String,
    pub forward: Procedure,
    pub backward: Procedure,
}

/// A validated `<prefix>_<slug>` unit name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitName<'a> {
    pub prefix: &'a str,
    pub slug: &'a str,
}

impl<'a> UnitName<'a> {
    pub fn parse(name: &'a str) -> Result<Self, MigrationError> {
        let caps = UNIT_NAME
            .captures(name)
            .ok_or_else(|| MigrationError::Load {
                name: name.to_string(),
                reason: "expected <YYYYMMDD[THHMMSS]>_<slug> with a lowercase slug".into(),
            })?;

        // Both groups are mandatory in the pattern.
        let prefix = caps.name("prefix").map_or("", |m| m.as_str());
        let slug = caps.name("slug").map_or("", |m| m.as_str());
        Ok(Self { prefix, slug })
    }
}
