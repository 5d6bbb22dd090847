use std::path::PathBuf;

use packbloom_types::error::Result;
use packbloom_types::Digest;

use crate::lookup::{DirectoryLookup, LookupStats};
use crate::reconcile::default_output;
use crate::store::Store;

/// Where a queried digest was found, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupHit {
    pub digest: Digest,
    /// `(pack directory, index name)` of the first index holding the digest.
    pub location: Option<(PathBuf, String)>,
}

#[derive(Debug, Default)]
pub struct LookupReport {
    pub hits: Vec<LookupHit>,
    pub stats: LookupStats,
    /// Directories searched without a usable filter.
    pub unfiltered_dirs: Vec<PathBuf>,
}

/// Look up each digest across the store's pack directories (or just `dir`),
/// using each directory's filter as a negative cache.
pub fn run(
    store: &Store,
    dir: Option<PathBuf>,
    output: Option<PathBuf>,
    digests: &[Digest],
) -> Result<LookupReport> {
    let dirs = match dir {
        Some(d) => vec![d],
        None => store.pack_dirs()?,
    };

    let mut report = LookupReport::default();
    let mut lookups = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let filter_path = output.clone().unwrap_or_else(|| default_output(&dir));
        let lookup = DirectoryLookup::open(&dir, &filter_path)?;
        if !lookup.has_filter() {
            report.unfiltered_dirs.push(dir.clone());
        }
        lookups.push((dir, lookup));
    }

    for digest in digests {
        let mut location = None;
        for (dir, lookup) in lookups.iter_mut() {
            if let Some(name) = lookup.find(digest) {
                location = Some((dir.clone(), name.to_string()));
                break;
            }
        }
        report.hits.push(LookupHit {
            digest: *digest,
            location,
        });
    }

    report.stats.queries = digests.len() as u64;
    for (_, lookup) in &lookups {
        let s = lookup.stats();
        report.stats.filter_negatives += s.filter_negatives;
        report.stats.index_probes += s.index_probes;
    }
    Ok(report)
}
