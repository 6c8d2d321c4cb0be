#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A cache directory plus an isolated config directory.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("config")).expect("config dir");
        Self { dir }
    }

    fn cache(&self) -> std::path::PathBuf {
        self.dir.path().join("cache")
    }

    fn remote(&self) -> std::path::PathBuf {
        self.dir.path().join("remote")
    }

    /// `mirrorfs` with no cache selected and the user's config hidden.
    fn bare(&self) -> Command {
        let mut cmd = Command::cargo_bin("mirrorfs").unwrap();
        cmd.env("MIRRORFS_CONFIG_DIR", self.dir.path().join("config"));
        cmd.env_remove("MIRRORFS_CACHE");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    fn mirrorfs(&self) -> Command {
        let mut cmd = self.bare();
        cmd.arg("--cache").arg(self.cache());
        cmd
    }

    fn put(&self, path: &str, data: &str, timestamp: i64) {
        self.mirrorfs()
            .args(["put", path, "--timestamp", &timestamp.to_string()])
            .write_stdin(data)
            .assert()
            .success();
    }
}

fn write_remote_file(root: &Path, rel: &str, data: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

#[test]
fn test_put_from_stdin_then_cat() {
    let fx = Fixture::new();
    fx.mirrorfs()
        .args(["put", "/notes/hello.txt"])
        .write_stdin("hello from stdin")
        .assert()
        .success();

    fx.mirrorfs()
        .args(["cat", "/notes/hello.txt"])
        .assert()
        .success()
        .stdout("hello from stdin");
}

#[test]
fn test_put_from_file_with_timestamp() {
    let fx = Fixture::new();
    let source = fx.dir.path().join("source.bin");
    fs::write(&source, b"file content").unwrap();

    fx.mirrorfs()
        .args(["put", "/a.bin", "--timestamp", "1700000000123", "--file"])
        .arg(&source)
        .assert()
        .success();

    fx.mirrorfs()
        .args(["stat", "/a.bin", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"timestamp\": 1700000000123"))
        .stdout(predicate::str::contains("\"length\": 12"))
        .stdout(predicate::str::contains("\"exists\": true"));
}

#[test]
fn test_append() {
    let fx = Fixture::new();
    fx.put("/log", "one\n", 1);
    fx.mirrorfs()
        .args(["put", "/log", "--append"])
        .write_stdin("two\n")
        .assert()
        .success();

    fx.mirrorfs().args(["cat", "/log"]).assert().success().stdout("one\ntwo\n");
}

#[test]
fn test_cat_missing_exits_not_found() {
    let fx = Fixture::new();
    fx.mirrorfs()
        .args(["cat", "/missing"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No cache entry"));
}

#[test]
fn test_invalid_path_is_usage_error() {
    let fx = Fixture::new();
    fx.mirrorfs().args(["cat", "/a/../b"]).assert().code(2);
}

#[test]
fn test_touch_changes_only_timestamp() {
    let fx = Fixture::new();
    fx.put("/t", "keep me", 100);

    fx.mirrorfs().args(["touch", "/t", "5000"]).assert().success();

    fx.mirrorfs()
        .args(["stat", "/t"])
        .assert()
        .success()
        .stdout(predicate::str::contains("timestamp: 5000"));
    fx.mirrorfs().args(["cat", "/t"]).assert().success().stdout("keep me");

    fx.mirrorfs().args(["touch", "/nope", "1"]).assert().code(3);
}

#[test]
fn test_rm_compacts_and_reports_missing() {
    let fx = Fixture::new();
    fx.put("/a/b", "", 1);

    fx.mirrorfs().args(["rm", "/a/b"]).assert().success();
    assert!(!fx.cache().join("a").exists(), "empty parent is compacted");
    assert!(fx.cache().exists());

    fx.mirrorfs()
        .args(["stat", "/a/b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:    false"));
    fx.mirrorfs().args(["rm", "/a/b"]).assert().code(3);
    fx.mirrorfs().args(["rm", "--force", "/a/b"]).assert().success();
}

#[test]
fn test_ls_marks_containers() {
    let fx = Fixture::new();
    fx.put("/docs/readme.md", "r", 1);
    fx.put("/top.txt", "t", 1);

    fx.mirrorfs()
        .arg("ls")
        .assert()
        .success()
        .stdout("docs/\ntop.txt\n");
    fx.mirrorfs()
        .args(["ls", "/docs"])
        .assert()
        .success()
        .stdout("readme.md\n");
}

#[test]
fn test_sync_pull_then_push() {
    let fx = Fixture::new();
    write_remote_file(&fx.remote(), "site/index.html", "<h1>remote</h1>");

    fx.mirrorfs()
        .args(["sync", "/", "--direction", "pull", "--remote"])
        .arg(fx.remote())
        .assert()
        .success()
        .stdout(predicate::str::contains("pulled 1"));
    fx.mirrorfs()
        .args(["cat", "/site/index.html"])
        .assert()
        .success()
        .stdout("<h1>remote</h1>");

    fx.put("/site/new.html", "<p>local</p>", 1_000);
    fx.mirrorfs()
        .args(["sync", "/site", "--direction", "push", "--remote"])
        .arg(fx.remote())
        .assert()
        .success()
        .stdout(predicate::str::contains("pushed 2"));
    assert_eq!(
        fs::read_to_string(fx.remote().join("site/new.html")).unwrap(),
        "<p>local</p>"
    );
}

#[test]
fn test_sync_json_report() {
    let fx = Fixture::new();
    write_remote_file(&fx.remote(), "a", "1");
    write_remote_file(&fx.remote(), "b", "2");

    fx.mirrorfs()
        .args(["sync", "--json", "--direction", "refresh", "--remote"])
        .arg(fx.remote())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pulled\": 2"))
        .stdout(predicate::str::contains("\"cancelled\": false"));
}

#[test]
fn test_sync_partial_failure_exit_code() {
    let fx = Fixture::new();
    // The cache holds a plain file where the remote has a directory, so the
    // pulled child has no valid parent.
    fx.put("/clash", "file", 1);
    write_remote_file(&fx.remote(), "clash/child", "x");
    write_remote_file(&fx.remote(), "fine", "y");

    fx.mirrorfs()
        .args(["sync", "/", "--direction", "pull", "--remote"])
        .arg(fx.remote())
        .assert()
        .code(4)
        .stdout(predicate::str::contains("failed 1"))
        .stderr(predicate::str::contains("/clash/child"));

    fx.mirrorfs().args(["cat", "/fine"]).assert().success().stdout("y");
}

#[test]
fn test_config_file_supplies_roots() {
    let fx = Fixture::new();
    write_remote_file(&fx.remote(), "from-config", "configured");
    fs::write(
        fx.dir.path().join("config/config.toml"),
        format!(
            "cache_root = {:?}\nremote_root = {:?}\nsync_on_close = false\n",
            fx.cache().display().to_string(),
            fx.remote().display().to_string()
        ),
    )
    .unwrap();

    fx.bare().args(["sync", "--direction", "pull"]).assert().success();
    fx.bare().args(["cat", "/from-config"]).assert().success().stdout("configured");
}

#[test]
fn test_missing_cache_is_an_error() {
    let fx = Fixture::new();
    fx.bare()
        .args(["ls"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No cache directory"));
}

#[test]
fn test_stats_and_pending() {
    let fx = Fixture::new();
    fx.mirrorfs()
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pending_deletions\": 0"))
        .stdout(predicate::str::contains("\"commits\""));
    fx.mirrorfs()
        .args(["stats", "--format", "table"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache root:"));
    fx.mirrorfs().arg("pending").assert().success().stdout("");
}
