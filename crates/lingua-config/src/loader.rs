use std::path::{Path, PathBuf};

use lingua_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CONFIG_FILENAMES: &[&str] = &["config.yml", "config.yaml", "config.toml"];

/// Resolves and parses the Lingua configuration file.
///
/// Lookup order: an explicit path, then `config.{yml,yaml,toml}` in the
/// config directory. When no file exists the defaults are used. Environment
/// overrides (`LINGUA_DB_PATH`, `LINGUA_MIGRATIONS_DIR`, `LINGUA_LOG`) are
/// applied last.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Loader rooted at `~/.config/lingua` (or the platform equivalent).
    pub fn from_default_dir() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lingua");
        Self::new(dir)
    }

    /// Load from `explicit` if given, otherwise search the config directory.
    pub fn load(&self, explicit: Option<&Path>) -> Result<AppConfig> {
        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                parse_config_file(path)?
            }
            None => match self.find_config_file() {
                Some(path) => parse_config_file(&path)?,
                None => {
                    debug!(
                        "no config file in {}, using defaults",
                        self.config_dir.display()
                    );
                    AppConfig::default()
                }
            },
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        CONFIG_FILENAMES
            .iter()
            .map(|name| self.config_dir.join(name))
            .find(|path| path.is_file())
    }
}

fn parse_config_file(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let config = match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error: {e}")))?,
        "toml" => toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("TOML parse error: {e}")))?,
        other => {
            return Err(Error::Config(format!(
                "unsupported config extension: {other}"
            )));
        }
    };

    info!("loaded config from {}", path.display());
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(path) = var("LINGUA_DB_PATH").filter(|v| !v.is_empty()) {
        config.database.path = PathBuf::from(path);
    }
    if let Some(dir) = var("LINGUA_MIGRATIONS_DIR").filter(|v| !v.is_empty()) {
        config.migrations.dir = PathBuf::from(dir);
    }
    if let Some(level) = var("LINGUA_LOG").filter(|v| !v.is_empty()) {
        config.log.level = level;
    }
}
