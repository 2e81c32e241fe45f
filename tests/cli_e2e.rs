//! End-to-end CLI tests for the textbook-downloader binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use textbook_core::IndexStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pdf_bytes(size: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.5\n".to_vec();
    bytes.resize(size, b'7');
    bytes
}

fn write_listing(root: &Path, category: &str, rows: &[(&str, &str, &str)]) {
    let dir = root.join(category);
    std::fs::create_dir_all(&dir).unwrap();
    let mut content = String::from("| ক্রমিক | বইয়ের নাম | ডাউনলোড |\n|---|---|---|\n");
    for (n, (title, label, url)) in rows.iter().enumerate() {
        content.push_str(&format!("| {} | {title} | [{label}]({url}) |\n", n + 1));
    }
    std::fs::write(dir.join("index.md"), content).unwrap();
}

/// Binary command with an isolated config home and no colors.
fn downloader(temp: &TempDir) -> Command {
    let config_home = temp.path().join("xdg-config");
    std::fs::create_dir_all(&config_home).unwrap();
    let mut cmd = Command::cargo_bin("textbook-downloader").unwrap();
    cmd.env("XDG_CONFIG_HOME", &config_home)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn input_root(temp: &TempDir) -> PathBuf {
    let root = temp.path().join("2025");
    std::fs::create_dir_all(&root).unwrap();
    root
}

#[test]
fn test_binary_help_displays_usage() {
    let temp = TempDir::new().unwrap();
    downloader(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--retry-failed"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_binary_version_displays_version() {
    let temp = TempDir::new().unwrap();
    downloader(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_binary_missing_input_root_exits_one() {
    let temp = TempDir::new().unwrap();
    downloader(&temp)
        .arg(temp.path().join("does-not-exist"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("is not a directory"));
}

#[test]
fn test_binary_invalid_concurrency_is_rejected() {
    let temp = TempDir::new().unwrap();
    downloader(&temp)
        .arg(input_root(&temp))
        .args(["-c", "0"])
        .assert()
        .failure();
}

#[test]
fn test_binary_invalid_config_file_exits_one() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("bad.toml");
    std::fs::write(&config, "concurrency = 500\n").unwrap();

    downloader(&temp)
        .arg(input_root(&temp))
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_binary_dry_run_prints_plan_without_writing() {
    let temp = TempDir::new().unwrap();
    let root = input_root(&temp);
    write_listing(
        &root,
        "primary/class-1",
        &[("Math", "Link-1", "https://drive.google.com/file/d/ABC/view")],
    );

    downloader(&temp)
        .arg(&root)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("id=ABC"))
        .stdout(predicate::str::contains("primary/class-1/PDFs/Math_1.pdf"))
        .stdout(predicate::str::contains("Dry run: 1 to download"));

    assert!(!root.join("index.json").exists());
    assert!(!root.join("primary/class-1/PDFs").exists());
}

#[tokio::test]
async fn test_binary_full_run_writes_pdfs_index_and_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/math.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_bytes(4096)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/art.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let root = input_root(&temp);
    let out = temp.path().join("out");
    let math = format!("{}/math.pdf", server.uri());
    let art = format!("{}/art.pdf", server.uri());
    write_listing(
        &root,
        "primary",
        &[("Math", "Link-1", &math), ("Art", "Link-1", &art)],
    );

    downloader(&temp)
        .arg(&root)
        .arg("--output")
        .arg(&out)
        .args(["-r", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found:                2"))
        .stdout(predicate::str::contains("Downloaded:           1"))
        .stdout(predicate::str::contains("Failed:               1"))
        .stdout(predicate::str::contains("Art (Link 1):"))
        .stdout(predicate::str::contains("HTTP 404"));

    assert_eq!(
        std::fs::metadata(out.join("primary/PDFs/Math_1.pdf"))
            .unwrap()
            .len(),
        4096
    );
    assert!(!out.join("primary/PDFs/Art_1.pdf").exists());

    let index = IndexStore::read_snapshot(&out.join("index.json")).unwrap();
    assert_eq!(index.summary.total_found, 2);
    assert_eq!(index.summary.total_succeeded, 1);
    assert_eq!(index.summary.total_failed, 1);
}

#[tokio::test]
async fn test_binary_retry_failed_only_refetches_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_bytes(2048)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/later.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/later.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_bytes(3072)))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let root = input_root(&temp);
    let ok = format!("{}/ok.pdf", server.uri());
    let later = format!("{}/later.pdf", server.uri());
    write_listing(
        &root,
        "secondary",
        &[("Physics", "Link-1", &ok), ("Physics", "Link-2", &later)],
    );

    downloader(&temp).arg(&root).args(["-r", "0"]).assert().success();
    downloader(&temp)
        .arg(&root)
        .args(["-r", "0", "--retry-failed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not selected:         1"));

    assert!(root.join("secondary/PDFs/Physics_1.pdf").exists());
    assert!(root.join("secondary/PDFs/Physics_2.pdf").exists());
    let index = IndexStore::read_snapshot(&root.join("index.json")).unwrap();
    assert_eq!(index.summary.total_succeeded, 2);
}

#[test]
fn test_binary_locked_index_exits_one() {
    let temp = TempDir::new().unwrap();
    let root = input_root(&temp);
    write_listing(&root, "primary", &[("Math", "Link-1", "http://127.0.0.1:1/m.pdf")]);

    let _held = IndexStore::open(&root.join("index.json")).unwrap();

    downloader(&temp)
        .arg(&root)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to open index"));
}
