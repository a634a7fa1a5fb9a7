//! Integration tests for all CLI commands
//!
//! Every invocation runs with `HOME` and the working directory pointed at a
//! fresh temporary directory, so no settings file of the host is picked up.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Helper to create an isolated CLI command
fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_treepdf"));
    cmd.env("HOME", dir).env_remove("RUST_LOG").current_dir(dir);
    cmd
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// `notes/` with two text files and a zip holding a third
fn notes_tree(dir: &Path) {
    let root = dir.join("notes");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.txt"), "first file\n").unwrap();
    fs::write(root.join("b.md"), "# second file\n").unwrap();
    fs::write(root.join("c.zip"), zip_bytes(&[("inner.txt", b"third file\n")])).unwrap();
}

fn page_count(path: &Path) -> usize {
    lopdf::Document::load(path).unwrap().get_pages().len()
}

// ============ CONVERT COMMAND TESTS ============

#[test]
fn test_convert_help() {
    let dir = TempDir::new().unwrap();
    cli(dir.path())
        .args(["convert", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Archives (zip, tar, tar.gz, tar.bz2, 7z)"));
}

#[test]
fn test_convert_directory_with_archive() {
    let dir = TempDir::new().unwrap();
    notes_tree(dir.path());

    cli(dir.path())
        .arg("convert")
        .arg("notes")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 pages from 3 files, 0 error pages"));

    assert_eq!(page_count(&dir.path().join("notes.pdf")), 3);
}

#[test]
fn test_convert_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    notes_tree(dir.path());
    fs::write(dir.path().join("out.pdf"), "keep me").unwrap();

    cli(dir.path())
        .args(["convert", "notes", "-o", "out.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(fs::read_to_string(dir.path().join("out.pdf")).unwrap(), "keep me");

    cli(dir.path())
        .args(["convert", "notes", "-o", "out.pdf", "--force", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert_eq!(page_count(&dir.path().join("out.pdf")), 3);
}

#[test]
fn test_convert_never_overwrites_input() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.pdf"), "%PDF-1.4 original").unwrap();

    // notes.pdf would be written to notes.pdf
    cli(dir.path())
        .args(["convert", "notes.pdf", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is the input"));
    cli(dir.path())
        .args(["convert", "notes.pdf", "-o", "./notes.pdf", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is the input"));
    cli(dir.path())
        .args(["convert", "notes.pdf", "-o", "out.pdf", "--report", "notes.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is the input"));

    assert_eq!(
        fs::read_to_string(dir.path().join("notes.pdf")).unwrap(),
        "%PDF-1.4 original"
    );
    assert!(!dir.path().join("out.pdf").exists());
}

#[test]
fn test_convert_archive_size_limit() {
    let dir = TempDir::new().unwrap();
    notes_tree(dir.path());
    let report = dir.path().join("report.json");

    cli(dir.path())
        .args(["convert", "notes", "--archive-size-limit", "4", "--strict", "--report"])
        .arg(&report)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("notes/c.zip: archive too large"));

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(report).unwrap()).unwrap();
    assert_eq!(report["pages"], 3);
    assert_eq!(report["diagnostics"][0]["kind"], "too_large");
    assert_eq!(report["diagnostics"][0]["path"], "notes/c.zip");
}

#[test]
fn test_convert_without_archives() {
    let dir = TempDir::new().unwrap();
    notes_tree(dir.path());

    cli(dir.path())
        .args(["convert", "notes", "--no-archives", "--no-labels"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 error pages"))
        .stderr(predicate::str::contains("notes/c.zip: no converter succeeded"));
}

#[test]
fn test_convert_missing_input() {
    let dir = TempDir::new().unwrap();
    cli(dir.path())
        .args(["convert", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input not found"));
}

#[test]
fn test_convert_uses_project_config() {
    let dir = TempDir::new().unwrap();
    notes_tree(dir.path());
    fs::write(dir.path().join(".treepdf.toml"), "[archive]\nenabled = false\n").unwrap();

    cli(dir.path())
        .args(["convert", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 error pages"));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.toml"), "[pipeline]\njobs = 0\n").unwrap();

    cli(dir.path())
        .args(["--config", "bad.toml", "formats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pipeline.jobs"));
}

// ============ OTHER COMMANDS ============

#[test]
fn test_fonts_json() {
    let dir = TempDir::new().unwrap();
    let output = cli(dir.path()).args(["fonts", "--json"]).output().unwrap();
    assert!(output.status.success());

    let fonts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let programs: Vec<&str> = fonts
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["program"].as_str().unwrap())
        .collect();
    assert_eq!(programs.len(), 12);
    assert!(programs.contains(&"helvetica"));
    assert!(programs.contains(&"courierbi"));
}

#[test]
fn test_sample_writes_one_page() {
    let dir = TempDir::new().unwrap();
    cli(dir.path())
        .args(["sample", "Quick brown fox", "--font", "timesB", "-o", "sample.pdf"])
        .assert()
        .success();
    assert_eq!(page_count(&dir.path().join("sample.pdf")), 1);

    cli(dir.path())
        .args(["sample", "x", "--font", "nosuchfont", "-o", "bad.pdf"])
        .assert()
        .failure();
}

#[test]
fn test_inspect_archive() {
    let dir = TempDir::new().unwrap();
    let archive = zip_bytes(&[("backup/one.txt", b"1"), ("backup/two.txt", b"22")]);
    fs::write(dir.path().join("backup.zip"), archive).unwrap();

    cli(dir.path())
        .args(["inspect", "backup.zip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Format:            zip"))
        .stdout(predicate::str::contains("Top-level folder:  backup"))
        .stdout(predicate::str::contains("backup/two.txt"));

    cli(dir.path())
        .args(["inspect", "backup.zip", "--size-limit", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("backup.zip"));
}

#[test]
fn test_formats_lists_rar_as_unsupported() {
    let dir = TempDir::new().unwrap();
    let output = cli(dir.path()).args(["formats", "--json"]).output().unwrap();
    let formats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rar = formats
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["format"] == "rar")
        .unwrap();
    assert_eq!(rar["status"], "unsupported");
}

#[test]
fn test_converters_status() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".treepdf.toml"),
        "[converters]\nuniversal = \"/nonexistent/any2pdf\"\n",
    )
    .unwrap();

    cli(dir.path())
        .arg("converters")
        .assert()
        .success()
        .stdout(predicate::str::contains("Status of the configured Converters"))
        .stdout(predicate::str::contains("builtin:text"))
        .stdout(predicate::str::contains(
            "Please install the \"/nonexistent/any2pdf\" program on the server.",
        ));
}
