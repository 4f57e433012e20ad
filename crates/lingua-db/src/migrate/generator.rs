use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, TimeDelta, Utc};
use regex::Regex;
use tracing::info;

use super::MigrationError;
use super::source::{DOWN_MARKER, DirectorySource, MigrationSource, UP_MARKER};
use super::unit::UnitName;

/// `chrono` format of generated name prefixes, e.g. `20250301T045752`.
pub const PREFIX_FORMAT: &str = "%Y%m%dT%H%M%S";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]").expect("slug pattern is valid"));

/// A freshly written unit skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedUnit {
    pub name: String,
    pub path: PathBuf,
}

/// Writes new, correctly ordered unit skeletons into a migrations directory.
#[derive(Debug, Clone)]
pub struct Generator {
    dir: PathBuf,
}

impl Generator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create `<prefix>_<slug>.sql` stamped with the current UTC time.
    pub fn create(&self, slug: &str) -> Result<CreatedUnit, MigrationError> {
        self.create_at(slug, Utc::now())
    }

    /// As [`create`](Self::create), with an explicit clock reading.
    ///
    /// The new name always sorts after every unit already in the directory.
    /// If the name stamped with `now` would not, the prefix is moved just past
    /// the newest existing one: one second for a timestamp prefix, the start
    /// of the next day for a date-only prefix.
    pub fn create_at(
        &self,
        slug: &str,
        now: DateTime<Utc>,
    ) -> Result<CreatedUnit, MigrationError> {
        let slug = sanitize_slug(slug)?;

        fs::create_dir_all(&self.dir).map_err(|source| MigrationError::GeneratorIo {
            path: self.dir.clone(),
            source,
        })?;

        let source = DirectorySource::new(&self.dir);
        let latest = source
            .discover()?
            .into_iter()
            .filter(|name| UnitName::parse(name).is_ok())
            .max();

        let mut name = compose_name(now.naive_utc().trunc_subsecs(0), &slug);
        if let Some(latest) = latest.filter(|latest| *latest >= name) {
            name = compose_name(stamp_after(&latest)?, &slug);
        }

        let path = source.unit_path(&name);
        write_skeleton(&path, &name, now)?;

        info!("created migration {}", path.display());
        Ok(CreatedUnit { name, path })
    }
}

fn compose_name(stamp: NaiveDateTime, slug: &str) -> String {
    format!("{}_{slug}", stamp.format(PREFIX_FORMAT))
}

/// Earliest stamp whose prefix sorts after the prefix of `name`.
fn stamp_after(name: &str) -> Result<NaiveDateTime, MigrationError> {
    let prefix = UnitName::parse(name)?.prefix;
    if let Ok(stamp) = NaiveDateTime::parse_from_str(prefix, PREFIX_FORMAT) {
        return Ok(stamp + TimeDelta::seconds(1));
    }
    NaiveDate::parse_from_str(prefix, "%Y%m%d")
        .ok()
        .and_then(|date| date.succ_opt())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            MigrationError::Generator(format!(
                "cannot order a new unit after {name}: prefix {prefix} is not a valid date"
            ))
        })
}

/// Lower-case `slug` and replace anything outside `[A-Za-z0-9]` with `_`.
pub fn sanitize_slug(slug: &str) -> Result<String, MigrationError> {
    let safe = UNSAFE_CHARS.replace_all(slug.trim(), "_").to_lowercase();
    if !safe.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(MigrationError::Generator(format!(
            "slug {slug:?} has no usable characters"
        )));
    }
    Ok(safe)
}

fn write_skeleton(path: &Path, name: &str, now: DateTime<Utc>) -> Result<(), MigrationError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| match source.kind() {
            ErrorKind::AlreadyExists => {
                MigrationError::Generator(format!("migration {name} already exists"))
            }
            _ => MigrationError::GeneratorIo {
                path: path.to_path_buf(),
                source,
            },
        })?;

    let body = format!(
        "-- {name}\n-- created {}\n\n{UP_MARKER}\n\n\n{DOWN_MARKER}\n\n",
        now.to_rfc3339()
    );

    if let Err(source) = file.write_all(body.as_bytes()).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(MigrationError::GeneratorIo {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
