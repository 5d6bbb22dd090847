use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

use packbloom_core::bloom::BloomFilter;
use packbloom_core::index::write_pack_index_in;
use packbloom_core::reconcile::default_output;
use packbloom_core::store::{Store, INDEX_CACHE_DIR};
use packbloom_types::Digest;

struct CliFixture {
    _tmp: TempDir,
    work_dir: PathBuf,
    home_dir: PathBuf,
    repo_dir: PathBuf,
    envs: Vec<(&'static str, String)>,
}

impl CliFixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let work_dir = tmp.path().join("work");
        let home_dir = tmp.path().join("home");
        let repo_dir = tmp.path().join("repo");

        std::fs::create_dir_all(&work_dir).unwrap();
        std::fs::create_dir_all(&home_dir).unwrap();
        Store::init(&repo_dir).unwrap();

        Self {
            _tmp: tmp,
            work_dir,
            home_dir,
            repo_dir,
            envs: Vec::new(),
        }
    }

    fn packs(&self) -> PathBuf {
        self.repo_dir.join("packs")
    }

    fn repo_arg(&self) -> String {
        self.repo_dir.to_string_lossy().to_string()
    }

    fn add_index(&self, dir: &Path, seed: &str, n: usize) -> (PathBuf, Vec<Digest>) {
        let digests: Vec<Digest> = (0..n)
            .map(|i| Digest::compute(format!("{seed}:{i}").as_bytes()))
            .collect();
        let path = write_pack_index_in(dir, digests.iter().copied()).unwrap();
        (path, digests)
    }

    fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(packbloom_binary_path());
        cmd.args(args);
        cmd.current_dir(&self.work_dir);
        cmd.env("HOME", &self.home_dir);
        cmd.env("XDG_CONFIG_HOME", self.home_dir.join(".config"));
        cmd.env_remove("PACKBLOOM_REPO");
        cmd.env_remove("PACKBLOOM_CONFIG");
        cmd.env_remove("RUST_LOG");
        for (key, val) in &self.envs {
            cmd.env(key, val);
        }
        cmd.output().unwrap()
    }

    fn run_ok(&self, args: &[&str]) -> (String, String) {
        let output = self.run(args);
        if !output.status.success() {
            panic!(
                "command failed: {:?}\nstdout:\n{}\nstderr:\n{}",
                args,
                stdout(&output),
                stderr(&output)
            );
        }
        (stdout(&output), stderr(&output))
    }

    fn run_err(&self, args: &[&str]) -> (String, String) {
        let output = self.run(args);
        assert!(
            !output.status.success(),
            "command unexpectedly succeeded: {:?}\nstdout:\n{}\nstderr:\n{}",
            args,
            stdout(&output),
            stderr(&output)
        );
        (stdout(&output), stderr(&output))
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn packbloom_binary_path() -> PathBuf {
    if let Some(path) = std::env::var_os("CARGO_BIN_EXE_packbloom") {
        return PathBuf::from(path);
    }

    let current_exe = std::env::current_exe().expect("failed to resolve current test binary path");
    let debug_dir = current_exe
        .parent()
        .and_then(|p| p.parent())
        .expect("unexpected test binary path layout");

    #[cfg(windows)]
    let candidate = debug_dir.join("packbloom.exe");
    #[cfg(not(windows))]
    let candidate = debug_dir.join("packbloom");

    assert!(
        candidate.exists(),
        "unable to locate packbloom binary at {:?}",
        candidate
    );
    candidate
}

fn yaml_quote_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

#[test]
fn bloom_create_extend_and_settle() {
    let fx = CliFixture::new();
    let repo = fx.repo_arg();
    fx.add_index(&fx.packs(), "a", 100);
    fx.add_index(&fx.packs(), "b", 50);

    let (_, err) = fx.run_ok(&["--repo", &repo, "bloom", "-k", "4"]);
    assert!(err.contains("bloom: creating from 2 files (150 objects)."), "{err}");

    fx.add_index(&fx.packs(), "c", 25);
    let (_, err) = fx.run_ok(&["--repo", &repo, "bloom"]);
    assert!(err.contains("bloom: adding 1 files (25 objects)."), "{err}");

    let (_, err) = fx.run_ok(&["--repo", &repo, "bloom"]);
    assert!(!err.contains("bloom: "), "{err}");

    let filter = BloomFilter::open(&default_output(&fx.packs())).unwrap();
    assert_eq!(filter.len(), 175);
    assert_eq!(filter.k(), 4);
}

#[test]
fn bloom_prefixes_later_directories() {
    let fx = CliFixture::new();
    let cache = fx.repo_dir.join(INDEX_CACHE_DIR).join("origin");
    std::fs::create_dir_all(&cache).unwrap();
    fx.add_index(&fx.packs(), "local", 10);
    fx.add_index(&cache, "remote", 10);

    let (_, err) = fx.run_ok(&["--repo", &fx.repo_arg(), "bloom"]);
    assert!(err.contains("bloom: creating from 1 files (10 objects)."));
    assert!(err.contains("bloom: index-cache/origin: creating from 1 files (10 objects)."));
}

#[test]
fn check_passes_then_fails_after_ruin() {
    let fx = CliFixture::new();
    let repo = fx.repo_arg();
    let (idx, _) = fx.add_index(&fx.packs(), "a", 25);
    let idx = idx.to_string_lossy().to_string();
    fx.run_ok(&["--repo", &repo, "bloom"]);

    let (out, _) = fx.run_ok(&["--repo", &repo, "bloom", "--check", &idx]);
    assert!(out.contains("All tests passed."));

    fx.run_ok(&["--repo", &repo, "bloom", "--ruin"]);
    let (out, err) = fx.run_err(&["--repo", &repo, "bloom", "--check", &idx]);
    assert!(!out.contains("All tests passed."));
    assert!(err.contains("missing"));
    assert!(err.contains("WARNING: 25 errors encountered during bloom."), "{err}");
}

#[test]
fn ruin_without_filter_fails() {
    let fx = CliFixture::new();
    let (_, err) = fx.run_err(&["--repo", &fx.repo_arg(), "bloom", "--ruin"]);
    assert!(err.contains("not found to ruin"), "{err}");
    assert!(err.contains("WARNING: 1 errors encountered during bloom."));
}

#[test]
fn invalid_flags_are_rejected() {
    let fx = CliFixture::new();
    let repo = fx.repo_arg();
    fx.run_err(&["--repo", &repo, "bloom", "-k", "6"]);
    fx.run_err(&["--repo", &repo, "bloom", "--ruin", "--check", "x.idx"]);
    fx.run_err(&["--repo", &repo, "bloom", "--workers", "0"]);
}

#[test]
fn missing_repository_is_an_error() {
    let fx = CliFixture::new();
    let (_, err) = fx.run_err(&["bloom"]);
    assert!(err.contains("no repository specified"), "{err}");

    let missing = fx.work_dir.join("nope").to_string_lossy().to_string();
    let (_, err) = fx.run_err(&["--repo", &missing, "bloom"]);
    assert!(err.contains("repository not found"), "{err}");
}

#[test]
fn repository_from_environment() {
    let mut fx = CliFixture::new();
    fx.add_index(&fx.packs(), "a", 10);
    let repo = fx.repo_arg();
    fx.envs.push(("PACKBLOOM_REPO", repo));
    fx.run_ok(&["bloom"]);
    assert!(default_output(&fx.packs()).exists());
}

#[test]
fn config_file_supplies_repository_and_hashes() {
    let fx = CliFixture::new();
    fx.add_index(&fx.packs(), "a", 10);
    std::fs::write(
        fx.work_dir.join("packbloom.yaml"),
        format!(
            "repository: {}\nbloom:\n  hashes: 4\n  workers: 2\n",
            yaml_quote_path(&fx.repo_dir)
        ),
    )
    .unwrap();

    fx.run_ok(&["bloom"]);
    let filter = BloomFilter::open(&default_output(&fx.packs())).unwrap();
    assert_eq!(filter.k(), 4);
}

#[test]
fn explicit_config_must_exist() {
    let fx = CliFixture::new();
    let (_, err) = fx.run_err(&["--repo", &fx.repo_arg(), "--config", "absent.yaml", "bloom"]);
    assert!(err.contains("configuration error"), "{err}");
}

#[test]
fn lookup_reports_locations() {
    let fx = CliFixture::new();
    let repo = fx.repo_arg();
    let (idx, digests) = fx.add_index(&fx.packs(), "a", 10);
    fx.run_ok(&["--repo", &repo, "bloom"]);

    let absent = Digest::compute(b"absent").to_hex();
    let present = digests[0].to_hex();
    let (out, _) = fx.run_ok(&["--repo", &repo, "lookup", &present, &absent]);

    let name = idx.file_name().unwrap().to_string_lossy().to_string();
    assert!(out.contains(&format!("{present} packs/{name}")), "{out}");
    assert!(out.contains(&format!("{absent} not found")), "{out}");

    let (_, err) = fx.run_err(&["--repo", &repo, "lookup", "not-hex"]);
    assert!(err.contains("invalid digest"), "{err}");
}
