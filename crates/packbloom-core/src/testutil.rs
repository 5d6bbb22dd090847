use std::path::{Path, PathBuf};

use tempfile::TempDir;

use packbloom_types::Digest;

use crate::config::BloomConfig;
use crate::index::write_pack_index_in;
use crate::reconcile::{default_output, reconcile_dir, ReconcileOutcome, ReconcileSession};
use crate::store::Store;

/// `n` distinct, deterministic digests derived from `seed`.
pub fn make_digests(seed: &str, n: usize) -> Vec<Digest> {
    (0..n)
        .map(|i| Digest::compute(format!("{seed}-{i}").as_bytes()))
        .collect()
}

/// Write a pack index of `n` digests into `dir`. Returns its path and digests.
pub fn write_index(dir: &Path, seed: &str, n: usize) -> (PathBuf, Vec<Digest>) {
    let digests = make_digests(seed, n);
    let path = write_pack_index_in(dir, digests.iter().copied()).expect("write pack index");
    (path, digests)
}

/// A fresh repository in a temp directory.
pub fn test_store() -> (TempDir, Store) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = Store::init(tmp.path()).expect("init store");
    (tmp, store)
}

pub fn bloom_config(k: Option<u8>) -> BloomConfig {
    BloomConfig {
        k,
        workers: 4,
        ..BloomConfig::default()
    }
}

/// Reconcile `dir` into its default filter location with a fresh session.
pub fn reconcile(dir: &Path, config: &BloomConfig) -> ReconcileOutcome {
    let mut session = ReconcileSession::new(None);
    reconcile_dir(dir, &default_output(dir), config, &mut session, None).expect("reconcile")
}
