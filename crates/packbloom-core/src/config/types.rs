use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use packbloom_types::error::{PackbloomError, Result};

use super::defaults::default_workers;
use crate::bloom::check_k;

/// Upper bound for `bloom.workers` / `--workers`.
pub const MAX_WORKERS: usize = 64;

/// Contents of a `packbloom.yaml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Repository root (the directory containing `packs/`).
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub bloom: BloomFileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BloomFileConfig {
    /// Probes per digest for newly created filters (4 or 5; unset = auto).
    #[serde(default)]
    pub hashes: Option<u8>,
    /// Max concurrent pack index readers during enumeration.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for BloomFileConfig {
    fn default() -> Self {
        Self {
            hashes: None,
            workers: default_workers(),
        }
    }
}

/// Options for one bloom run, built once at the CLI boundary.
#[derive(Debug, Clone)]
pub struct BloomConfig {
    /// Ignore any existing filter and rebuild from scratch.
    pub force: bool,
    /// Requested probe count; `None` keeps an existing filter's `k` or picks one.
    pub k: Option<u8>,
    /// Pinned output filter path shared by every scanned directory.
    pub output: Option<PathBuf>,
    /// Restrict the run to this one pack directory.
    pub dir: Option<PathBuf>,
    pub workers: usize,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            force: false,
            k: None,
            output: None,
            dir: None,
            workers: default_workers(),
        }
    }
}

impl BloomConfig {
    /// Start from file settings; CLI flags are layered on by the caller.
    pub fn from_file(file: &FileConfig) -> Self {
        Self {
            k: file.bloom.hashes,
            workers: file.bloom.workers,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(k) = self.k {
            check_k(k)?;
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(PackbloomError::Config(format!(
                "bloom.workers must be in [1, {MAX_WORKERS}], got {}",
                self.workers
            )));
        }
        Ok(())
    }
}
