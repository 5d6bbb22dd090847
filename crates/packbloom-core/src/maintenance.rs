use std::path::Path;

use tracing::debug;

use packbloom_types::error::{PackbloomError, Result};
use packbloom_types::Digest;

use crate::bloom::BloomFilter;
use crate::index::PackIndex;

/// Zero the bit array of the filter at `path`, keeping its header and
/// covered-index list. Every subsequent `check` of a covered index fails.
pub fn ruin_filter(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(PackbloomError::NotFound(path.display().to_string()));
    }
    let mut filter = BloomFilter::open_rw(path, 0)?;
    filter.ruin()?;
    filter.close()?;
    debug!(path = %path.display(), "bloom: ruined filter");
    Ok(())
}

/// Result of verifying one pack index against a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// There is no filter file to check against.
    NoFilter,
    /// The filter does not list the index as covered, so nothing was checked.
    NotCovered { index_name: String },
    /// Every digest of the index was tested; `missing` are the ones denied.
    Checked {
        index_name: String,
        checked: u64,
        missing: Vec<Digest>,
    },
}

/// Test every digest in `idx` against the filter at `filter_path`.
///
/// A bare file name for `idx` is resolved inside `dir`. A denied digest can
/// only mean corruption, since the filter has no false negatives.
pub fn check_filter(dir: &Path, filter_path: &Path, idx: &Path) -> Result<CheckOutcome> {
    if !filter_path.exists() {
        return Ok(CheckOutcome::NoFilter);
    }
    let filter = BloomFilter::open(filter_path)?;
    if !filter.valid() {
        return Err(PackbloomError::InvalidFilter(format!(
            "{} is invalid",
            filter_path.display()
        )));
    }

    let index_name = idx
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PackbloomError::InvalidIndex(format!("bad index path: {}", idx.display())))?
        .to_string();
    if !filter.covers_index(&index_name) {
        return Ok(CheckOutcome::NotCovered { index_name });
    }

    let idx_path = if idx.parent().is_some_and(|p| !p.as_os_str().is_empty()) {
        idx.to_path_buf()
    } else {
        dir.join(idx)
    };
    let index = PackIndex::open(&idx_path)?;

    let missing: Vec<Digest> = index.iter().filter(|d| !filter.exists(d)).collect();
    Ok(CheckOutcome::Checked {
        index_name,
        checked: index.len(),
        missing,
    })
}
