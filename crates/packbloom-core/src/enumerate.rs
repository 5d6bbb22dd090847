use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use globset::{Glob, GlobMatcher};
use tracing::debug;

use packbloom_types::error::{PackbloomError, Result};

use crate::bloom::BloomFilter;
use crate::index::{PackIndex, INDEX_EXTENSION};

/// Default upper bound on concurrently opened pack indexes.
pub const DEFAULT_ENUMERATE_WORKERS: usize = 16;

/// One pack index as seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    pub path: PathBuf,
    pub count: u64,
}

/// Pack indexes of a directory, split by whether an existing filter covers them.
#[derive(Debug, Default, Clone)]
pub struct Classification {
    pub covered: Vec<IndexEntry>,
    pub covered_count: u64,
    pub new: Vec<IndexEntry>,
    pub new_count: u64,
}

impl Classification {
    /// Move every covered index into `new`, for a rebuild from scratch.
    pub fn fold_covered_into_new(&mut self) {
        self.new.append(&mut self.covered);
        self.new.sort_by(|a, b| a.name.cmp(&b.name));
        self.new_count += self.covered_count;
        self.covered_count = 0;
    }

    fn sort(&mut self) {
        self.covered.sort_by(|a, b| a.name.cmp(&b.name));
        self.new.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

// ---------------------------------------------------------------------------
// Accumulator: shared state for classification workers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AccumulatorState {
    classification: Classification,
    first_error: Option<PackbloomError>,
}

/// Mutex-guarded totals that enumeration workers append into.
///
/// Each record call takes the lock once and updates both the list and its
/// counter, so the final result does not depend on worker interleaving.
#[derive(Default)]
pub struct Accumulator {
    state: Mutex<AccumulatorState>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_covered(&self, entry: IndexEntry) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.classification.covered_count += entry.count;
        st.classification.covered.push(entry);
    }

    pub fn record_new(&self, entry: IndexEntry) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.classification.new_count += entry.count;
        st.classification.new.push(entry);
    }

    /// Keep the first failure; later ones are logged only.
    pub fn record_error(&self, path: &Path, err: PackbloomError) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if st.first_error.is_none() {
            st.first_error = Some(err);
        } else {
            debug!(path = %path.display(), error = %err, "enumerate: additional failure");
        }
    }

    pub fn covered_count(&self) -> u64 {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.classification.covered_count
    }

    pub fn new_count(&self) -> u64 {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.classification.new_count
    }

    /// Final, name-sorted classification, or the first recorded error.
    pub fn into_classification(self) -> Result<Classification> {
        let st = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(err) = st.first_error {
            return Err(err);
        }
        let mut classification = st.classification;
        classification.sort();
        Ok(classification)
    }
}

// ---------------------------------------------------------------------------
// Directory scan
// ---------------------------------------------------------------------------

fn index_matcher() -> Result<GlobMatcher> {
    Glob::new(&format!("*.{INDEX_EXTENSION}"))
        .map(|g| g.compile_matcher())
        .map_err(|e| PackbloomError::Other(format!("invalid index glob: {e}")))
}

/// List the pack index files directly inside `dir`, sorted by name.
pub fn list_pack_indexes(dir: &Path) -> Result<Vec<PathBuf>> {
    let matcher = index_matcher()?;
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

fn classify_one(path: &Path, existing: Option<&BloomFilter>, acc: &Accumulator) {
    let index = match PackIndex::open(path) {
        Ok(index) => index,
        Err(e) => {
            acc.record_error(path, e);
            return;
        }
    };
    let entry = IndexEntry {
        name: index.name().to_string(),
        path: index.path().to_path_buf(),
        count: index.len(),
    };
    if existing.is_some_and(|f| f.covers_index(&entry.name)) {
        acc.record_covered(entry);
    } else {
        acc.record_new(entry);
    }
}

/// Open and classify every pack index in `dir` on up to `workers` threads.
///
/// Returns only after every worker has finished. Indexes named in the
/// `existing` filter's covered list go to `covered`, the rest to `new`.
pub fn enumerate_dir(
    dir: &Path,
    existing: Option<&BloomFilter>,
    workers: usize,
) -> Result<Classification> {
    let paths = list_pack_indexes(dir)?;
    let acc = Accumulator::new();
    if paths.is_empty() {
        return acc.into_classification();
    }

    let workers = workers.clamp(1, paths.len());
    debug!(
        dir = %dir.display(),
        indexes = paths.len(),
        workers,
        "enumerate: classifying pack indexes"
    );

    std::thread::scope(|s| {
        let (work_tx, work_rx) = crossbeam_channel::bounded::<PathBuf>(workers * 2);
        for _ in 0..workers {
            let rx = work_rx.clone();
            let acc = &acc;
            s.spawn(move || {
                for path in rx {
                    classify_one(&path, existing, acc);
                }
            });
        }
        drop(work_rx);

        for path in paths {
            if work_tx.send(path).is_err() {
                break;
            }
        }
        drop(work_tx);
    });

    acc.into_classification()
}
