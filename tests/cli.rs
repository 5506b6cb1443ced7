//! CLI test cases.
//!
//! Nothing here touches the screen or the mouse. Anything that would needs
//! a display, `xdotool` and `img2pdf`, so those tests are ignored by default.

use std::{fs, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("book-capture").unwrap()
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_capture_help_lists_policy_flags() {
    cmd()
        .args(["capture", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--duplicate-threshold"))
        .stdout(predicate::str::contains("--settle"));
}

#[test]
fn test_schema_settings() {
    cmd()
        .args(["schema", "Settings"])
        .assert()
        .success()
        .stdout(predicate::str::contains("next_button"));
}

#[test]
fn test_schema_report() {
    cmd()
        .args(["schema", "HandoffReport"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stopped_by_duplicates"));
}

#[test]
fn test_capture_without_region_fails_fast() {
    cmd()
        .args(["capture", "--click", "500,500", "--pages", "3", "--warmup", "60"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn test_capture_with_inverted_region_fails_fast() {
    cmd()
        .args(["capture", "--top-left", "500,500", "--bottom-right", "100,100"])
        .args(["--click", "600,300", "--pages", "3", "--warmup", "60"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn test_capture_with_zero_pages_fails_fast() {
    cmd()
        .args(["capture", "--top-left", "0,0", "--bottom-right", "100,100"])
        .args(["--click", "600,300", "--pages", "0", "--warmup", "60"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("page count"));
}

#[test]
fn test_capture_reads_settings_file() {
    let dir = tempfile::TempDir::with_prefix("cli-settings").unwrap();
    let settings = dir.path().join("reader.toml");
    // Everything except the click point.
    fs::write(
        &settings,
        "top_left = [0, 0]\nbottom_right = [100, 100]\npages = 2\n",
    )
    .unwrap();
    cmd()
        .arg("capture")
        .arg("--settings")
        .arg(&settings)
        .args(["--warmup", "60"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("next-page button"));
}

#[test]
fn test_ocr_rejects_missing_pdf() {
    cmd()
        .args(["ocr", "definitely-not-here.pdf", "--ocr", "tesseract"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no such PDF"));
}

#[test]
#[ignore = "Needs a display, xdotool and img2pdf, and takes over the mouse"]
fn test_capture_one_page() {
    let dir = tempfile::TempDir::with_prefix("cli-capture").unwrap();
    cmd()
        .args(["capture", "--top-left", "0,0", "--bottom-right", "200,200"])
        .args(["--click", "100,100", "--pages", "1", "--warmup", "0"])
        .args(["--ocr", "none", "--no-timestamp", "--name", "one_page"])
        .arg("--out-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"success\""));
    assert!(dir.path().join("one_page.pdf").exists());
}
