//! CLI integration tests against a JSON dataset file.
//!
//! Tests run without a terminal on stdin, so prompts are declined unless
//! `--yes` is passed.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::path::Path;

fn reference(id: &str, key: &str) -> Value {
    json!({ "_type": "reference", "_ref": id, "_key": key })
}

/// The published artist lists e1 and e3, its draft lists e1 and e2. Only
/// e1 and e3 point back, so publishing leaves e2 missing and e3 orphaned.
fn dataset() -> Value {
    json!([
        { "_id": "artist-1", "_type": "artist", "name": "Nina",
          "events": [reference("e1", "a"), reference("e3", "b")] },
        { "_id": "drafts.artist-1", "_type": "artist", "name": "Nina",
          "events": [reference("e1", "a"), reference("e2", "c")] },
        { "_id": "e1", "_type": "event", "title": "Opening", "artist": [reference("artist-1", "d")] },
        { "_id": "e2", "_type": "event", "title": "Closing" },
        { "_id": "e3", "_type": "event", "title": "Matinee", "artist": [reference("artist-1", "e")] },
        { "_id": "artistsPage", "_type": "artistsPage", "artists": [reference("artist-1", "f")] }
    ])
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        dir.child("dataset.json")
            .write_str(&serde_json::to_string_pretty(&dataset()).unwrap())
            .unwrap();
        dir.child("refsync.toml")
            .write_str("[store]\nkind = \"file\"\npath = \"dataset.json\"\n")
            .unwrap();
        Self { dir }
    }

    fn cmd(&self) -> Command {
        self.cmd_with_config(&self.dir.path().join("refsync.toml"))
    }

    fn cmd_with_config(&self, config: &Path) -> Command {
        let mut cmd = Command::cargo_bin("refsync").unwrap();
        cmd.current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env_remove("XDG_CONFIG_HOME")
            .env_remove("REFSYNC_CONFIG")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(config);
        cmd
    }

    fn document(&self, id: &str) -> Option<Value> {
        let text = std::fs::read_to_string(self.dir.path().join("dataset.json")).unwrap();
        let docs: Vec<Value> = serde_json::from_str(&text).unwrap();
        docs.into_iter().find(|d| d["_id"] == id)
    }

    fn refs(&self, id: &str, field: &str) -> Vec<String> {
        self.document(id)
            .and_then(|d| d[field].as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|r| r["_ref"].as_str().map(str::to_string))
            .collect()
    }
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("refsync")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("publish"))
        .stdout(predicate::str::contains("delete"));
}

#[test]
fn check_reports_without_writing() {
    let fx = Fixture::new();
    let before = std::fs::read_to_string(fx.dir.path().join("dataset.json")).unwrap();

    fx.cmd()
        .args(["check", "artist-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("artist.events <-> event.artist"))
        .stdout(predicate::str::contains("missing: 1 event"))
        .stdout(predicate::str::contains("Closing (e2)"))
        .stdout(predicate::str::contains("orphaned: none"))
        .stdout(predicate::str::contains("1 reference to reconcile"));

    let after = std::fs::read_to_string(fx.dir.path().join("dataset.json")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn publish_with_yes_repairs_both_directions() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["publish", "drafts.artist-1", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Published artist-1"))
        .stdout(predicate::str::contains("additions: accepted, 1 document patched"))
        .stdout(predicate::str::contains("removals: accepted, 1 document patched"));

    assert!(fx.document("drafts.artist-1").is_none());
    assert_eq!(fx.refs("artist-1", "events"), vec!["e1", "e2"]);
    assert_eq!(fx.refs("e2", "artist"), vec!["artist-1"]);
    assert!(fx.refs("e3", "artist").is_empty());

    fx.cmd()
        .args(["check", "artist-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("References are consistent"));
}

#[test]
fn publish_without_terminal_declines_repairs() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["publish", "artist-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("additions: declined"))
        .stdout(predicate::str::contains("removals: declined"));

    assert!(fx.document("drafts.artist-1").is_none());
    assert!(fx.refs("e2", "artist").is_empty());
    assert_eq!(fx.refs("e3", "artist"), vec!["artist-1"]);
}

#[test]
fn dry_run_leaves_dataset_untouched() {
    let fx = Fixture::new();
    let before = std::fs::read_to_string(fx.dir.path().join("dataset.json")).unwrap();

    fx.cmd()
        .args(["publish", "artist-1", "--yes", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"));

    let after = std::fs::read_to_string(fx.dir.path().join("dataset.json")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn delete_strips_references_first() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["delete", "artist-1", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed references from 3 documents"))
        .stdout(predicate::str::contains("Deleted artist-1"));

    assert!(fx.document("artist-1").is_none());
    assert!(fx.document("drafts.artist-1").is_none());
    assert!(fx.refs("e1", "artist").is_empty());
    assert!(fx.refs("e3", "artist").is_empty());
    assert!(fx.refs("artistsPage", "artists").is_empty());
}

#[test]
fn delete_without_terminal_is_cancelled() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["delete", "artist-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Delete cancelled"));

    assert!(fx.document("artist-1").is_some());
}

#[test]
fn actions_show_disabled_reason() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["actions", "e1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Publish: disabled (No unpublished changes)"))
        .stdout(predicate::str::contains("Delete: enabled"));
}

#[test]
fn unknown_document_fails() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["publish", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("document 'ghost' not found"));
}

#[test]
fn invalid_config_fails() {
    let fx = Fixture::new();
    fx.dir
        .child("refsync.toml")
        .write_str("[store]\nkind = \"ftp\"\n")
        .unwrap();

    fx.cmd()
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid store kind"));
}

#[test]
fn config_validate_and_show() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("2 relationships, 3 entity types"));

    fx.cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[[relationship]]"))
        .stdout(predicate::str::contains("source_type = \"artist\""));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let fx = Fixture::new();
    let target = fx.dir.child("generated.toml");

    fx.cmd()
        .args(["config", "init"])
        .arg(target.path())
        .assert()
        .success();
    target.assert(predicate::str::contains("[[entity]]"));

    fx.cmd()
        .args(["config", "init"])
        .arg(target.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    fx.cmd_with_config(target.path())
        .args(["config", "validate"])
        .assert()
        .success();
}

#[test]
fn completion_needs_no_config() {
    Command::cargo_bin("refsync")
        .unwrap()
        .args(["--config", "/nonexistent/refsync.toml", "completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("refsync"));
}
