mod defaults;
mod types;

use std::fmt;
use std::path::{Path, PathBuf};

use packbloom_types::error::{PackbloomError, Result};

pub use self::types::{BloomConfig, BloomFileConfig, FileConfig, MAX_WORKERS};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "PACKBLOOM_CONFIG";

/// Environment variable naming the repository root.
pub const REPO_ENV: &str = "PACKBLOOM_REPO";

/// Tracks where the config file was found.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Explicitly passed via `--config`.
    CliArg(PathBuf),
    /// Set via the `PACKBLOOM_CONFIG` env var.
    EnvVar(PathBuf),
    /// Found by searching standard locations.
    SearchOrder { path: PathBuf, level: &'static str },
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::CliArg(p) => p,
            ConfigSource::EnvVar(p) => p,
            ConfigSource::SearchOrder { path, .. } => path,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::CliArg(p) => write!(f, "{} (--config)", p.display()),
            ConfigSource::EnvVar(p) => write!(f, "{} ({CONFIG_ENV})", p.display()),
            ConfigSource::SearchOrder { path, level } => {
                write!(f, "{} ({})", path.display(), level)
            }
        }
    }
}

/// Returns search locations in priority order: project, then user.
pub fn default_config_search_paths() -> Vec<(PathBuf, &'static str)> {
    let mut paths = vec![(PathBuf::from("packbloom.yaml"), "project")];

    let user_config = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|base| base.join("packbloom").join("config.yaml"));
    if let Some(p) = user_config {
        paths.push((p, "user"));
    }

    paths
}

/// Find the config file: `--config`, then `PACKBLOOM_CONFIG`, then the search paths.
/// Unlike an explicit path, searched locations that do not exist are skipped.
pub fn resolve_config_path(cli_config: Option<&str>) -> Option<ConfigSource> {
    if let Some(path) = cli_config {
        return Some(ConfigSource::CliArg(PathBuf::from(path)));
    }

    if let Ok(val) = std::env::var(CONFIG_ENV) {
        if !val.is_empty() {
            return Some(ConfigSource::EnvVar(PathBuf::from(val)));
        }
    }

    default_config_search_paths()
        .into_iter()
        .find(|(path, _)| path.exists())
        .map(|(path, level)| ConfigSource::SearchOrder { path, level })
}

/// Load and parse a config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| PackbloomError::Config(format!("cannot read '{}': {e}", path.display())))?;
    let config: FileConfig = serde_yaml::from_str(&contents)
        .map_err(|e| PackbloomError::Config(format!("invalid config '{}': {e}", path.display())))?;
    Ok(config)
}
