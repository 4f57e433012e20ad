use std::borrow::Cow;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::MigrationError;
use super::unit::{MigrationUnit, Procedure, UnitName};

/// File extension of on-disk migration units.
pub const UNIT_EXTENSION: &str = "sql";

pub const UP_MARKER: &str = "-- migrate:up";
pub const DOWN_MARKER: &str = "-- migrate:down";

/// Where migration units come from.
pub trait MigrationSource {
    /// Unit names in application order (ascending).
    fn discover(&self) -> Result<Vec<String>, MigrationError>;

    /// Resolve a discovered name into its procedures.
    fn load(&self, name: &str) -> Result<MigrationUnit, MigrationError>;
}

/// A directory of `<name>.sql` files, each split into an up and a down
/// section by `-- migrate:up` / `-- migrate:down` marker lines.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn unit_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{UNIT_EXTENSION}"))
    }

    fn discovery_error(&self, source: std::io::Error) -> MigrationError {
        MigrationError::Discovery {
            path: self.dir.clone(),
            source,
        }
    }
}

impl MigrationSource for DirectorySource {
    fn discover(&self) -> Result<Vec<String>, MigrationError> {
        match fs::metadata(&self.dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(self.discovery_error(std::io::Error::new(
                    ErrorKind::NotADirectory,
                    "not a directory",
                )));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.dir).map_err(|e| self.discovery_error(e))?;
                info!("created migrations directory {}", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.discovery_error(e)),
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| self.discovery_error(e))? {
            let path = entry.map_err(|e| self.discovery_error(e))?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != UNIT_EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => names.push(stem.to_string()),
                None => warn!("skipping migration file with non-UTF-8 name: {}", path.display()),
            }
        }

        names.sort();
        Ok(names)
    }

    fn load(&self, name: &str) -> Result<MigrationUnit, MigrationError> {
        UnitName::parse(name)?;

        let path = self.unit_path(name);
        let contents = fs::read_to_string(&path).map_err(|e| MigrationError::Load {
            name: name.to_string(),
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        parse_unit_file(name, &contents)
    }
}

/// Split a unit file into its up and down sections.
pub fn parse_unit_file(name: &str, contents: &str) -> Result<MigrationUnit, MigrationError> {
    let malformed = |reason: &str| MigrationError::Load {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut up: Option<Vec<&str>> = None;
    let mut down: Option<Vec<&str>> = None;

    for line in contents.lines() {
        let marker = line.trim().to_ascii_lowercase();
        if marker == UP_MARKER {
            if up.is_some() {
                return Err(malformed("duplicate -- migrate:up marker"));
            }
            if down.is_some() {
                return Err(malformed("-- migrate:down appears before -- migrate:up"));
            }
            up = Some(Vec::new());
        } else if marker == DOWN_MARKER {
            if down.is_some() {
                return Err(malformed("duplicate -- migrate:down marker"));
            }
            down = Some(Vec::new());
        } else if let Some(section) = down.as_mut().or(up.as_mut()) {
            section.push(line);
        } else if !is_blank_or_comment(line) {
            return Err(malformed("statements before -- migrate:up"));
        }
    }

    let up = up.ok_or_else(|| malformed("missing -- migrate:up marker"))?;
    let down = down.unwrap_or_default();

    Ok(MigrationUnit {
        name: name.to_string(),
        forward: Procedure::Sql(Cow::Owned(up.join("\n"))),
        backward: Procedure::Sql(Cow::Owned(down.join("\n"))),
    })
}

fn is_blank_or_comment(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with("--")
}
