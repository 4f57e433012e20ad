use std::collections::HashSet;

use super::MigrationError;
use super::source::MigrationSource;
use super::unit::{MigrationUnit, Procedure, UnitName};

/// A migration unit compiled into the binary.
///
/// Declared as a `const` next to the schema it changes and listed in a
/// static slice handed to [`Registry::new`].
#[derive(Debug, Clone)]
pub struct RegisteredUnit {
    pub name: &'static str,
    pub forward: Procedure,
    pub backward: Procedure,
}

/// Compiled-in migration source: a static name → procedures mapping.
#[derive(Debug, Clone)]
pub struct Registry {
    units: Vec<RegisteredUnit>,
}

impl Registry {
    /// Build a registry, validating names and rejecting duplicates.
    pub fn new(units: &[RegisteredUnit]) -> Result<Self, MigrationError> {
        let mut seen = HashSet::new();
        for unit in units {
            UnitName::parse(unit.name)?;
            if !seen.insert(unit.name) {
                return Err(MigrationError::DuplicateUnit(unit.name.to_string()));
            }
        }

        let mut units = units.to_vec();
        units.sort_by(|a, b| a.name.cmp(b.name));
        Ok(Self { units })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl MigrationSource for Registry {
    fn discover(&self) -> Result<Vec<String>, MigrationError> {
        Ok(self.units.iter().map(|u| u.name.to_string()).collect())
    }

    fn load(&self, name: &str) -> Result<MigrationUnit, MigrationError> {
        let unit = self
            .units
            .binary_search_by(|u| u.name.cmp(name))
            .map(|idx| &self.units[idx])
            .map_err(|_| MigrationError::Load {
                name: name.to_string(),
                reason: "not registered".into(),
            })?;

        Ok(MigrationUnit {
            name: unit.name.to_string(),
            forward: unit.forward.clone(),
            backward: unit.backward.clone(),
        })
    }
}
