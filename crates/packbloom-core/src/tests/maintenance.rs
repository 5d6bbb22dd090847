use packbloom_types::error::PackbloomError;

use crate::maintenance::{check_filter, ruin_filter, CheckOutcome};
use crate::reconcile::default_output;
use crate::testutil::{bloom_config, reconcile, write_index};

#[test]
fn check_passes_on_fresh_filter() {
    let tmp = tempfile::tempdir().unwrap();
    let (idx, _) = write_index(tmp.path(), "a", 100);
    reconcile(tmp.path(), &bloom_config(None));

    let outcome = check_filter(tmp.path(), &default_output(tmp.path()), &idx).unwrap();
    match outcome {
        CheckOutcome::Checked {
            checked, missing, ..
        } => {
            assert_eq!(checked, 100);
            assert!(missing.is_empty());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn bare_index_name_resolves_inside_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let (idx, _) = write_index(tmp.path(), "a", 10);
    reconcile(tmp.path(), &bloom_config(None));

    let bare = std::path::PathBuf::from(idx.file_name().unwrap());
    let outcome = check_filter(tmp.path(), &default_output(tmp.path()), &bare).unwrap();
    assert!(matches!(outcome, CheckOutcome::Checked { checked: 10, .. }));
}

#[test]
fn ruined_filter_fails_check_for_every_digest() {
    let tmp = tempfile::tempdir().unwrap();
    let (idx, mut digests) = write_index(tmp.path(), "a", 64);
    reconcile(tmp.path(), &bloom_config(None));

    ruin_filter(&default_output(tmp.path())).unwrap();
    let outcome = check_filter(tmp.path(), &default_output(tmp.path()), &idx).unwrap();
    match outcome {
        CheckOutcome::Checked {
            checked, missing, ..
        } => {
            assert_eq!(checked, 64);
            digests.sort();
            assert_eq!(missing, digests);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn check_without_filter_reports_no_filter() {
    let tmp = tempfile::tempdir().unwrap();
    let (idx, _) = write_index(tmp.path(), "a", 5);
    let outcome = check_filter(tmp.path(), &default_output(tmp.path()), &idx).unwrap();
    assert_eq!(outcome, CheckOutcome::NoFilter);
}

#[test]
fn check_of_uncovered_index_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    write_index(tmp.path(), "a", 5);
    reconcile(tmp.path(), &bloom_config(None));
    let (later, _) = write_index(tmp.path(), "later", 5);

    let outcome = check_filter(tmp.path(), &default_output(tmp.path()), &later).unwrap();
    let expected_name = later.file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(
        outcome,
        CheckOutcome::NotCovered {
            index_name: expected_name
        }
    );
}

#[test]
fn check_rejects_invalid_filter() {
    let tmp = tempfile::tempdir().unwrap();
    let (idx, _) = write_index(tmp.path(), "a", 5);
    reconcile(tmp.path(), &bloom_config(None));
    let output = default_output(tmp.path());
    let mut bytes = std::fs::read(&output).unwrap();
    bytes.push(0);
    std::fs::write(&output, bytes).unwrap();

    let err = check_filter(tmp.path(), &output, &idx).unwrap_err();
    assert!(matches!(err, PackbloomError::InvalidFilter(_)));
}

#[test]
fn ruin_missing_filter_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let err = ruin_filter(&default_output(tmp.path())).unwrap_err();
    assert!(matches!(err, PackbloomError::NotFound(_)));
}
