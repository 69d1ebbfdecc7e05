use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn dslc(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dslc").expect("dslc binary");
    cmd.arg("--project-dir").arg(project).env("NO_COLOR", "1");
    cmd
}

fn stage(project: &Path, files: &[(&str, &str)]) {
    let staging = project.join(".dslc/staging");
    let _ = fs::remove_dir_all(&staging);
    for (path, content) in files {
        let native = staging.join(path);
        fs::create_dir_all(native.parent().expect("parent")).expect("mkdir");
        fs::write(native, content).expect("write");
    }
}

#[test]
fn targets_lists_the_table() {
    let project = TempDir::new().expect("project");
    dslc(project.path())
        .arg("targets")
        .assert()
        .success()
        .stdout(predicate::str::contains("java_client"))
        .stdout(predicate::str::contains("typescript"));
}

#[test]
fn targets_json_is_machine_readable() {
    let project = TempDir::new().expect("project");
    let output = dslc(project.path())
        .args(["targets", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert!(parsed
        .as_array()
        .expect("array")
        .iter()
        .any(|t| t["name"] == "dotnet_client" && t["build"] == "csc"));
}

#[test]
fn init_writes_config_once() {
    let project = TempDir::new().expect("project");
    dslc(project.path())
        .args(["init", "java_client"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dslc.yaml"));
    assert!(project.path().join("dslc.yaml").is_file());

    dslc(project.path())
        .args(["init", "java_client"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn init_rejects_unknown_target() {
    let project = TempDir::new().expect("project");
    dslc(project.path())
        .args(["init", "cobol"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown target 'cobol'"));
    assert!(!project.path().join("dslc.yaml").exists());
}

#[test]
fn sync_reconciles_then_reports_no_changes() {
    let project = TempDir::new().expect("project");
    dslc(project.path()).args(["init", "java_client"]).assert().success();
    stage(
        project.path(),
        &[
            ("java/com/acme/User.java", "class User {}"),
            ("java/project.ini", "[deps]"),
        ],
    );

    dslc(project.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 created"));
    let generated = project.path().join("generated");
    assert_eq!(
        fs::read_to_string(generated.join("java/com/acme/User.java")).expect("read"),
        "class User {}"
    );
    assert!(!generated.join("java/project.ini").exists());
    assert_eq!(
        fs::read_to_string(project.path().join("project.ini")).expect("read"),
        "[deps]"
    );

    dslc(project.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes."));
}

#[test]
fn sync_moves_renamed_files() {
    let project = TempDir::new().expect("project");
    stage(project.path(), &[("src/Old.ts", "export {}")]);
    dslc(project.path()).arg("sync").assert().success();

    stage(project.path(), &[("src/New.ts", "export {}")]);
    dslc(project.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 moved"));
    assert!(project.path().join("generated/src/New.ts").is_file());
    assert!(!project.path().join("generated/src/Old.ts").exists());
}

#[test]
fn dry_run_writes_nothing() {
    let project = TempDir::new().expect("project");
    stage(project.path(), &[("a.php", "<?php")]);

    dslc(project.path())
        .args(["sync", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[dry-run]"))
        .stdout(predicate::str::contains("CREATED a.php"));
    assert!(!project.path().join("generated").exists());
}

#[test]
fn plan_json_lists_actions() {
    let project = TempDir::new().expect("project");
    stage(project.path(), &[("a.cs", "x"), ("b.cs", "x")]);

    let output = dslc(project.path())
        .args(["plan", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(parsed["counts"]["CREATED"], 1);
    assert_eq!(parsed["counts"]["COPY"], 1);
    assert_eq!(parsed["actions"][0]["action"], "CREATED");
}

#[test]
fn exclude_flag_protects_output_paths() {
    let project = TempDir::new().expect("project");
    let generated = project.path().join("generated");
    fs::create_dir_all(&generated).expect("mkdir");
    fs::write(generated.join("notes.txt"), "mine").expect("write");
    stage(project.path(), &[("a.ts", "a")]);

    dslc(project.path())
        .args(["sync", "--exclude", "*.txt"])
        .assert()
        .success();
    assert!(generated.join("notes.txt").exists());
}

#[test]
fn missing_staging_is_an_error() {
    let project = TempDir::new().expect("project");
    dslc(project.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("staging directory"));
}

#[cfg(unix)]
#[test]
fn failing_post_sync_command_fails_the_sync() {
    let project = TempDir::new().expect("project");
    fs::write(
        project.path().join("dslc.yaml"),
        "post_sync: [\"false\"]\n",
    )
    .expect("config");
    stage(project.path(), &[("a.java", "class A {}")]);

    dslc(project.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("post-sync command"));

    dslc(project.path())
        .args(["sync", "--no-build"])
        .assert()
        .success();
}
