use std::path::PathBuf;

use packbloom_core::commands;
use packbloom_core::commands::bloom::BloomAction;
use packbloom_core::config::{BloomConfig, FileConfig};
use packbloom_core::reconcile::{ReconcileMode, ReconcileProgressEvent};
use packbloom_core::store::Store;

/// Flags of the `bloom` subcommand, layered over the config file.
pub(crate) struct BloomArgs {
    pub ruin: bool,
    pub force: bool,
    pub output: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub k: Option<u8>,
    pub check: Option<PathBuf>,
    pub workers: Option<u16>,
}

/// Returns `Ok(true)` when the run finished but recorded errors.
pub(crate) fn run_bloom(
    store: &Store,
    file_config: &FileConfig,
    args: BloomArgs,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = BloomConfig::from_file(file_config);
    config.force = args.force;
    config.output = args.output;
    config.dir = args.dir;
    if args.k.is_some() {
        config.k = args.k;
    }
    if let Some(w) = args.workers {
        config.workers = usize::from(w);
    }

    let action = match (args.ruin, args.check) {
        (true, _) => BloomAction::Ruin,
        (false, Some(idx)) => BloomAction::Check { idx },
        (false, None) => BloomAction::Generate,
    };

    let mut on_progress = |event: ReconcileProgressEvent| match event {
        ReconcileProgressEvent::Started {
            prefix,
            mode,
            files,
            objects,
        } => {
            let verb = match mode {
                ReconcileMode::Creating => "creating from",
                ReconcileMode::Adding => "adding",
            };
            eprintln!("bloom: {prefix}{verb} {files} files ({objects} objects).");
        }
        ReconcileProgressEvent::Writing { done, total } => {
            let pct = if total == 0 {
                100.0
            } else {
                done as f64 * 100.0 / total as f64
            };
            eprint!("\rbloom: writing {pct:.2}% ({done}/{total} objects)");
            if done == total {
                eprintln!();
            }
        }
    };

    let report = commands::bloom::run(store, &config, &action, Some(&mut on_progress))?;

    for warning in &report.warnings {
        eprintln!("Warning: {warning}");
    }
    for err in &report.errors {
        eprintln!("error: [{}] {}", err.context, err.message);
    }

    if report.has_errors() {
        eprintln!(
            "WARNING: {} errors encountered during bloom.",
            report.errors.len()
        );
        return Ok(true);
    }

    if matches!(action, BloomAction::Check { .. }) {
        println!("All tests passed.");
    }
    Ok(false)
}
