use std::path::Path;

use tracing::debug;

use packbloom_types::error::Result;
use packbloom_types::Digest;

use crate::bloom::BloomFilter;
use crate::enumerate::list_pack_indexes;
use crate::index::PackIndex;

/// Counters describing how lookups were answered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LookupStats {
    pub queries: u64,
    /// Queries answered "absent" by the filter without touching any index.
    pub filter_negatives: u64,
    /// Individual pack-index binary searches performed.
    pub index_probes: u64,
}

/// Existence queries over one pack directory.
///
/// Lookup order:
/// 1. Bloom filter, for indexes it covers (definite negatives stop here)
/// 2. Binary search of indexes the filter covers (only on a filter hit)
/// 3. Binary search of indexes the filter does not cover
pub struct DirectoryLookup {
    filter: Option<BloomFilter>,
    covered: Vec<PackIndex>,
    uncovered: Vec<PackIndex>,
    stats: LookupStats,
}

impl DirectoryLookup {
    /// Load every pack index in `dir`, plus the filter at `filter_path` if
    /// it exists and passes its structural check.
    pub fn open(dir: &Path, filter_path: &Path) -> Result<Self> {
        let filter = if filter_path.exists() {
            match BloomFilter::open(filter_path) {
                Ok(f) if f.valid() => Some(f),
                Ok(_) => {
                    debug!(path = %filter_path.display(), "lookup: ignoring invalid filter");
                    None
                }
                Err(e) => {
                    debug!(path = %filter_path.display(), error = %e, "lookup: ignoring unreadable filter");
                    None
                }
            }
        } else {
            None
        };

        let mut covered = Vec::new();
        let mut uncovered = Vec::new();
        for path in list_pack_indexes(dir)? {
            let index = PackIndex::open(&path)?;
            if filter.as_ref().is_some_and(|f| f.covers_index(index.name())) {
                covered.push(index);
            } else {
                uncovered.push(index);
            }
        }

        debug!(
            dir = %dir.display(),
            covered = covered.len(),
            uncovered = uncovered.len(),
            has_filter = filter.is_some(),
            "lookup: opened directory"
        );

        Ok(Self {
            filter,
            covered,
            uncovered,
            stats: LookupStats::default(),
        })
    }

    /// Name of the pack index holding `digest`, if any.
    pub fn find(&mut self, digest: &Digest) -> Option<&str> {
        self.stats.queries += 1;

        let filter_says_absent = self.filter.as_ref().is_some_and(|f| !f.exists(digest));
        if filter_says_absent {
            self.stats.filter_negatives += 1;
        } else {
            for index in &self.covered {
                self.stats.index_probes += 1;
                if index.contains(digest) {
                    return Some(index.name());
                }
            }
        }

        for index in &self.uncovered {
            self.stats.index_probes += 1;
            if index.contains(digest) {
                return Some(index.name());
            }
        }
        None
    }

    pub fn exists(&mut self, digest: &Digest) -> bool {
        self.find(digest).is_some()
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Number of pack indexes the filter does not cover.
    pub fn uncovered_len(&self) -> usize {
        self.uncovered.len()
    }

    pub fn stats(&self) -> LookupStats {
        self.stats
    }
}

impl std::fmt::Debug for DirectoryLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryLookup")
            .field("has_filter", &self.filter.is_some())
            .field("covered", &self.covered.len())
            .field("uncovered", &self.uncovered.len())
            .finish()
    }
}
