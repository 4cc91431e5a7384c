mod common;

use std::path::Path;
use std::process::{Command, Output};

fn diffcov(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_diffcov"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let report = common::lcov(&[("src/lib.rs", &[(1, 1), (2, 0), (3, 1), (4, 1)])]);
    std::fs::write(dir.path().join("lcov.info"), report).unwrap();
    let diff = common::added_lines(&[("src/lib.rs", &[(1, 4)])]);
    std::fs::write(dir.path().join("change.diff"), diff).unwrap();
    dir
}

#[test]
fn test_check_passes() {
    let dir = setup();
    let out = diffcov(
        dir.path(),
        &["check", "--report", "lcov.info", "--diff-file", "change.diff", "--fail-under", "75"],
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(out.status.code(), Some(0), "{stdout}");
    assert!(stdout.contains("Diff coverage: 75.0% (3/4 lines covered)"), "{stdout}");
    assert!(stdout.contains("missed: 2"), "{stdout}");
}

#[test]
fn test_check_fails_with_exit_code_one() {
    let dir = setup();
    let out = diffcov(
        dir.path(),
        &["check", "--report", "lcov.info", "--diff-file", "change.diff", "--min-lines", "90"],
    );
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).contains("FAILED"));

    let out = diffcov(
        dir.path(),
        &[
            "check", "--report", "lcov.info", "--diff-file", "change.diff", "--min-lines", "90",
            "--no-fail",
        ],
    );
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn test_check_reads_config_file() {
    let dir = setup();
    std::fs::write(
        dir.path().join("diffcov.toml"),
        "[thresholds]\nmin_lines = 90.0\n\n[[exclude]]\npattern = \"lib.rs\"\n",
    )
    .unwrap();

    let out = diffcov(
        dir.path(),
        &["check", "--report", "lcov.info", "--diff-file", "change.diff", "--output", "json"],
    );
    assert_eq!(out.status.code(), Some(0));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["files"][0]["excluded"], true);
    assert_eq!(json["project"]["files_excluded"], 1);
}

#[test]
fn test_errors_exit_with_two() {
    let dir = setup();

    let out = diffcov(dir.path(), &["check", "--report", "missing.info", "--diff-file", "change.diff"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("missing.info"));

    std::fs::write(dir.path().join("bad.diff"), "--- a/x\n+++ b/x\n@@ -1,2 +1,2 @@\n x\n").unwrap();
    let out = diffcov(dir.path(), &["check", "--report", "lcov.info", "--diff-file", "bad.diff"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Malformed diff"));

    let out = diffcov(
        dir.path(),
        &["check", "--report", "lcov.info", "--diff-file", "change.diff", "--fail-under", "101"],
    );
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_changed_lists_ranges() {
    let dir = setup();
    let out = diffcov(dir.path(), &["changed", "--diff-file", "change.diff"]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "src/lib.rs: 4 changed lines\n  1-4 added\n"
    );
}
