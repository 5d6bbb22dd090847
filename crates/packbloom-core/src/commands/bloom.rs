use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use packbloom_types::error::{PackbloomError, Result};

use crate::config::BloomConfig;
use crate::maintenance::{check_filter, ruin_filter, CheckOutcome};
use crate::reconcile::{
    default_output, reconcile_dir, ReconcileOutcome, ReconcileProgressEvent, ReconcileSession,
};
use crate::store::Store;

/// What to do with each directory's filter.
#[derive(Debug, Clone)]
pub enum BloomAction {
    /// Create or extend the filter.
    Generate,
    /// Zero the filter's bit array.
    Ruin,
    /// Verify one pack index against the filter.
    Check { idx: PathBuf },
}

/// A single problem found during a bloom run.
#[derive(Debug)]
pub struct BloomIssue {
    pub context: String,
    pub message: String,
}

/// What happened in one directory.
#[derive(Debug)]
pub enum DirectoryResult {
    Reconciled(ReconcileOutcome),
    Ruined,
    Checked(CheckOutcome),
}

/// Summary of a bloom run over every selected directory.
#[derive(Debug, Default)]
pub struct BloomReport {
    pub directories: Vec<(PathBuf, DirectoryResult)>,
    pub warnings: Vec<String>,
    pub errors: Vec<BloomIssue>,
}

impl BloomReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of directories whose filter was checked and found consistent.
    pub fn checks_passed(&self) -> usize {
        self.directories
            .iter()
            .filter(|(_, r)| {
                matches!(r, DirectoryResult::Checked(CheckOutcome::Checked { missing, .. }) if missing.is_empty())
            })
            .count()
    }
}

/// Directories a run covers: the pinned one, or every pack dir in the store.
fn selected_dirs(store: &Store, config: &BloomConfig) -> Result<Vec<PathBuf>> {
    match &config.dir {
        Some(dir) => {
            if !dir.is_dir() {
                return Err(PackbloomError::NotFound(dir.display().to_string()));
            }
            Ok(vec![dir.clone()])
        }
        None => store.pack_dirs(),
    }
}

/// Run `action` for every selected directory.
///
/// A failure in one directory is recorded and the run moves on to the next;
/// only problems that prevent selecting directories at all are returned as `Err`.
pub fn run(
    store: &Store,
    config: &BloomConfig,
    action: &BloomAction,
    mut progress: Option<&mut dyn FnMut(ReconcileProgressEvent)>,
) -> Result<BloomReport> {
    if matches!(action, BloomAction::Generate) {
        config.validate()?;
    }

    let dirs = selected_dirs(store, config)?;
    let mut report = BloomReport::default();

    if config.output.is_some() && dirs.len() > 1 {
        let msg = format!(
            "one output filter is shared by {} directories; index names must be unique across them",
            dirs.len()
        );
        warn!("bloom: {msg}");
        report.warnings.push(msg);
    }

    let mut session = ReconcileSession::new(Some(store.root()));
    for dir in dirs {
        debug!(dir = %dir.display(), "bloom: scanning");
        let output = config
            .output
            .clone()
            .unwrap_or_else(|| default_output(&dir));

        match action {
            BloomAction::Generate => {
                let reborrowed = progress
                    .as_mut()
                    .map(|cb| &mut **cb as &mut dyn FnMut(ReconcileProgressEvent));
                match reconcile_dir(&dir, &output, config, &mut session, reborrowed) {
                    Ok(outcome) => report
                        .directories
                        .push((dir, DirectoryResult::Reconciled(outcome))),
                    Err(e) => report.errors.push(BloomIssue {
                        context: store.relative(&dir),
                        message: e.to_string(),
                    }),
                }
            }
            BloomAction::Ruin => run_ruin(store, dir, &output, &mut report),
            BloomAction::Check { idx } => run_check(store, dir, &output, idx, &mut report),
        }
    }

    Ok(report)
}

fn run_ruin(store: &Store, dir: PathBuf, output: &Path, report: &mut BloomReport) {
    match ruin_filter(output) {
        Ok(()) => report.directories.push((dir, DirectoryResult::Ruined)),
        Err(PackbloomError::NotFound(_)) => report.errors.push(BloomIssue {
            context: store.relative(&dir),
            message: format!("{} not found to ruin", store.relative(output)),
        }),
        Err(e) => report.errors.push(BloomIssue {
            context: store.relative(&dir),
            message: e.to_string(),
        }),
    }
}

fn run_check(store: &Store, dir: PathBuf, output: &Path, idx: &Path, report: &mut BloomReport) {
    let shown_filter = store.relative(output);
    match check_filter(&dir, output, idx) {
        Ok(CheckOutcome::NoFilter) => {
            report
                .warnings
                .push(format!("{shown_filter}: does not exist"));
        }
        Ok(CheckOutcome::NotCovered { index_name }) => {
            report
                .warnings
                .push(format!("{shown_filter} does not contain {index_name}"));
        }
        Ok(outcome) => {
            if let CheckOutcome::Checked {
                index_name,
                missing,
                ..
            } = &outcome
            {
                for digest in missing {
                    report.errors.push(BloomIssue {
                        context: format!("{shown_filter} [{index_name}]"),
                        message: format!("object {digest} missing"),
                    });
                }
            }
            report.directories.push((dir, DirectoryResult::Checked(outcome)));
        }
        Err(e) => report.errors.push(BloomIssue {
            context: store.relative(&dir),
            message: e.to_string(),
        }),
    }
}
