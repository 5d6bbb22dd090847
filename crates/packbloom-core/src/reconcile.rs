//! Keeps one directory's bloom filter in step with its pack indexes.
//!
//! Concurrency: nothing here locks the directory against another process. A
//! full rebuild publishes with a single `rename`, so readers always see a
//! complete file, but two processes extending the same filter in place race
//! and the last writer wins. Callers must not run two reconcilers against one
//! directory at the same time.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use packbloom_types::error::Result;

use crate::bloom::{max_bloom_bits, BloomFilter, MAX_PFALSE_POSITIVE};
use crate::config::BloomConfig;
use crate::enumerate::{enumerate_dir, Classification};
use crate::index::PackIndex;
use crate::store::relative_to;

/// File name of a directory's filter when no output path is pinned.
pub const DEFAULT_FILTER_NAME: &str = "packbloom.bloom";

/// Name of the scratch file a rebuild writes before renaming it into place.
pub const TEMP_FILTER_NAME: &str = "packbloom.tmp.bloom";

/// Why an existing filter was discarded instead of extended.
#[derive(Debug, Clone, PartialEq)]
pub enum RebuildReason {
    /// `--force` was given.
    Forced,
    /// The file failed to parse or its structural check.
    Invalid,
    /// Header entry count disagrees with the covered indexes found on disk.
    Stale { filter_entries: u64, covered_entries: u64 },
    /// A different `k` was requested.
    HashCountChanged { existing: u8, requested: u8 },
    /// Adding the new entries would push the false-positive rate over the limit.
    TooFull { projected_pfalse: f64 },
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::Forced => write!(f, "forced"),
            RebuildReason::Invalid => write!(f, "existing filter is invalid"),
            RebuildReason::Stale {
                filter_entries,
                covered_entries,
            } => write!(f, "size {filter_entries} != idx total {covered_entries}"),
            RebuildReason::HashCountChanged {
                existing,
                requested,
            } => write!(f, "new k {requested} != existing k {existing}"),
            RebuildReason::TooFull { projected_pfalse } => write!(
                f,
                "adding entries gives {:.2}% false positives",
                projected_pfalse * 100.0
            ),
        }
    }
}

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Every pack index was already covered (or there were none).
    NothingToDo,
    /// A new filter was built from scratch and published by rename.
    Created {
        indexes: usize,
        objects: u64,
        k: u8,
        bits: u8,
        reason: Option<RebuildReason>,
    },
    /// The existing filter was extended in place.
    Extended {
        indexes: usize,
        objects: u64,
        k: u8,
        bits: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    Creating,
    Adding,
}

#[derive(Debug, Clone)]
pub enum ReconcileProgressEvent {
    Started {
        prefix: String,
        mode: ReconcileMode,
        files: usize,
        objects: u64,
    },
    Writing {
        done: u64,
        total: u64,
    },
}

fn emit_progress(
    progress: &mut Option<&mut dyn FnMut(ReconcileProgressEvent)>,
    event: ReconcileProgressEvent,
) {
    if let Some(callback) = progress.as_deref_mut() {
        callback(event);
    }
}

/// Cross-directory bookkeeping for one run: which directory came first, so
/// later directories can be prefixed in progress messages.
#[derive(Debug, Default)]
pub struct ReconcileSession {
    root: Option<PathBuf>,
    first: Option<PathBuf>,
}

impl ReconcileSession {
    /// `root` is used to shorten directory names in message prefixes.
    pub fn new(root: Option<&Path>) -> Self {
        Self {
            root: root.map(Path::to_path_buf),
            first: None,
        }
    }

    /// Empty for the first directory seen, `"<relative dir>: "` afterwards.
    pub fn prefix_for(&mut self, dir: &Path) -> String {
        let first = self.first.get_or_insert_with(|| dir.to_path_buf());
        if first.as_path() == dir {
            return String::new();
        }
        let shown = match &self.root {
            Some(root) => relative_to(root, dir),
            None => dir.display().to_string(),
        };
        format!("{shown}: ")
    }
}

/// Default filter location for a pack directory.
pub fn default_output(dir: &Path) -> PathBuf {
    dir.join(DEFAULT_FILTER_NAME)
}

/// Scratch file for a rebuild of `output`. It sits next to `output` so the
/// final `rename` never crosses a filesystem boundary.
pub(crate) fn temp_path_for(output: &Path) -> PathBuf {
    output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .join(TEMP_FILTER_NAME)
}

/// Open the filter at `output` unless it is missing or unusable.
fn open_existing(output: &Path, force: bool) -> (Option<BloomFilter>, Option<RebuildReason>) {
    if !output.exists() {
        return (None, None);
    }
    if force {
        return (None, Some(RebuildReason::Forced));
    }
    match BloomFilter::open(output) {
        Ok(filter) if filter.valid() => (Some(filter), None),
        Ok(_) => {
            debug!(path = %output.display(), "bloom: existing invalid filter found, regenerating");
            (None, Some(RebuildReason::Invalid))
        }
        Err(e) => {
            debug!(path = %output.display(), error = %e, "bloom: existing filter unreadable, regenerating");
            (None, Some(RebuildReason::Invalid))
        }
    }
}

/// Decide whether `filter` can absorb `plan.new` in place.
fn rebuild_reason(
    filter: &BloomFilter,
    plan: &Classification,
    requested_k: Option<u8>,
) -> Option<RebuildReason> {
    if filter.len() != plan.covered_count {
        return Some(RebuildReason::Stale {
            filter_entries: filter.len(),
            covered_entries: plan.covered_count,
        });
    }
    if let Some(requested) = requested_k {
        if requested != filter.k() {
            return Some(RebuildReason::HashCountChanged {
                existing: filter.k(),
                requested,
            });
        }
    }
    // A filter already at its maximum size is extended anyway: rebuilding
    // could not make it any bigger.
    let projected_pfalse = filter.pfalse_positive(plan.new_count);
    if filter.bits() < max_bloom_bits(filter.k()) && projected_pfalse > MAX_PFALSE_POSITIVE {
        return Some(RebuildReason::TooFull { projected_pfalse });
    }
    None
}

/// Bring the filter at `output` up to date with the pack indexes in `dir`.
pub fn reconcile_dir(
    dir: &Path,
    output: &Path,
    config: &BloomConfig,
    session: &mut ReconcileSession,
    mut progress: Option<&mut dyn FnMut(ReconcileProgressEvent)>,
) -> Result<ReconcileOutcome> {
    let (mut existing, mut reason) = open_existing(output, config.force);

    let mut plan = enumerate_dir(dir, existing.as_ref(), config.workers)?;
    if plan.new.is_empty() {
        debug!(dir = %dir.display(), "bloom: nothing to do");
        return Ok(ReconcileOutcome::NothingToDo);
    }

    if let Some(filter) = existing.as_ref() {
        if let Some(why) = rebuild_reason(filter, &plan, config.k) {
            debug!(dir = %dir.display(), reason = %why, "bloom: regenerating");
            reason = Some(why);
            existing = None;
        }
    }
    if existing.is_none() {
        // A discarded filter forgets everything, so the rebuild needs every index.
        plan.fold_covered_into_new();
    }

    let mode = if existing.is_some() {
        ReconcileMode::Adding
    } else {
        ReconcileMode::Creating
    };
    emit_progress(
        &mut progress,
        ReconcileProgressEvent::Started {
            prefix: session.prefix_for(dir),
            mode,
            files: plan.new.len(),
            objects: plan.new_count,
        },
    );

    let temp_path = match existing.take() {
        Some(_) => None,
        None => Some(temp_path_for(output)),
    };

    let written = fill_filter(output, temp_path.as_deref(), &plan, config, &mut progress);
    let (k, bits) = match written {
        Ok(kb) => kb,
        Err(e) => {
            if let Some(tmp) = &temp_path {
                let _ = std::fs::remove_file(tmp);
            }
            return Err(e);
        }
    };

    let indexes = plan.new.len();
    let objects = plan.new_count;
    match temp_path {
        Some(tmp) => {
            if let Err(e) = std::fs::rename(&tmp, output) {
                let _ = std::fs::remove_file(&tmp);
                return Err(e.into());
            }
            info!(
                path = %output.display(),
                indexes,
                objects,
                k,
                bits,
                "bloom: published new filter"
            );
            Ok(ReconcileOutcome::Created {
                indexes,
                objects,
                k,
                bits,
                reason,
            })
        }
        None => {
            info!(path = %output.display(), indexes, objects, "bloom: extended filter");
            Ok(ReconcileOutcome::Extended {
                indexes,
                objects,
                k,
                bits,
            })
        }
    }
}

/// Create (at `temp_path`) or reopen (at `output`) the filter, fold in every
/// index of `plan.new`, and close it. Returns the filter's `k` and `bits`.
fn fill_filter(
    output: &Path,
    temp_path: Option<&Path>,
    plan: &Classification,
    config: &BloomConfig,
    progress: &mut Option<&mut dyn FnMut(ReconcileProgressEvent)>,
) -> Result<(u8, u8)> {
    let mut filter = match temp_path {
        Some(tmp) => BloomFilter::create(tmp, plan.new_count, config.k)?,
        None => BloomFilter::open_rw(output, plan.new_count)?,
    };

    let total = plan.new_count;
    let mut done = 0u64;
    for entry in &plan.new {
        emit_progress(progress, ReconcileProgressEvent::Writing { done, total });
        let index = PackIndex::open(&entry.path)?;
        filter.add_index(&index)?;
        done += index.len();
    }
    emit_progress(progress, ReconcileProgressEvent::Writing { done, total });

    let kb = (filter.k(), filter.bits());
    filter.close()?;
    Ok(kb)
}
