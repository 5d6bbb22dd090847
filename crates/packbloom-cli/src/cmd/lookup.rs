use std::path::PathBuf;

use packbloom_core::commands;
use packbloom_core::store::Store;
use packbloom_types::Digest;

pub(crate) fn run_lookup(
    store: &Store,
    digests: &[String],
    dir: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let digests = digests
        .iter()
        .map(|s| Digest::from_hex(s))
        .collect::<Result<Vec<_>, _>>()?;

    let report = commands::lookup::run(store, dir, output, &digests)?;

    for dir in &report.unfiltered_dirs {
        tracing::info!("no usable filter in {}", store.relative(dir));
    }
    for hit in &report.hits {
        match &hit.location {
            Some((dir, name)) => println!("{} {}/{}", hit.digest, store.relative(dir), name),
            None => println!("{} not found", hit.digest),
        }
    }

    let stats = report.stats;
    tracing::info!(
        queries = stats.queries,
        filter_negatives = stats.filter_negatives,
        index_probes = stats.index_probes,
        "lookup complete"
    );
    Ok(())
}
