use std::path::{Path, PathBuf};

use packbloom_types::error::{PackbloomError, Result};

/// Primary pack directory under the repository root.
pub const PACKS_DIR: &str = "packs";

/// Parent of per-remote index cache directories, each its own pack directory.
pub const INDEX_CACHE_DIR: &str = "index-cache";

/// A repository on the local filesystem: the set of directories holding pack indexes.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open an existing repository. Fails if the primary pack directory is missing.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.join(PACKS_DIR).is_dir() {
            return Err(PackbloomError::RepoNotFound(root.display().to_string()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Create the repository layout if missing and open it.
    pub fn init(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root.join(PACKS_DIR))?;
        Self::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.root.join(PACKS_DIR)
    }

    /// Every pack directory: the primary one first, then index caches by name.
    pub fn pack_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = vec![self.pack_dir()];
        let cache_root = self.root.join(INDEX_CACHE_DIR);
        if cache_root.is_dir() {
            let mut cached = Vec::new();
            for entry in std::fs::read_dir(&cache_root)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    cached.push(entry.path());
                }
            }
            cached.sort();
            dirs.extend(cached);
        }
        Ok(dirs)
    }

    /// `path` relative to the repository root for messages; unchanged if outside it.
    pub fn relative(&self, path: &Path) -> String {
        relative_to(&self.root, path)
    }
}

pub fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
