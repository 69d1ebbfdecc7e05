use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use filetime::{set_file_mtime, FileTime};
use rstest::rstest;
use tempfile::TempDir;

use dslc_core::{FileEntry, RelativePath};
use dslc_sync::{
    loader, plan, reconcile, ActionKind, ContentHash, ContentIndex, ExclusionSet, PathAction,
    ReconcileOptions, ReconcileOutcome, RecordingObserver, SyncError,
};

type Tree = BTreeMap<String, Vec<u8>>;

fn tree(pairs: &[(&str, &str)]) -> Tree {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
        .collect()
}

fn seed(root: &Path, pairs: &[(&str, &str)]) {
    for (path, content) in pairs {
        let native = root.join(path);
        fs::create_dir_all(native.parent().expect("parent")).expect("mkdir");
        fs::write(native, content).expect("write");
    }
}

fn snapshot(root: &Path) -> Tree {
    loader::load_tree(root)
        .expect("load")
        .into_iter()
        .map(|e| (e.path.to_string(), e.content))
        .collect()
}

fn sync(root: &Path, desired: Tree) -> (ReconcileOutcome, RecordingObserver) {
    sync_with(root, desired, ReconcileOptions::default())
}

fn sync_with(
    root: &Path,
    desired: Tree,
    options: ReconcileOptions,
) -> (ReconcileOutcome, RecordingObserver) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut observer = RecordingObserver::default();
    let outcome = reconcile(root, desired, options, &mut observer).expect("reconcile");
    (outcome, observer)
}

fn one_day_ago() -> FileTime {
    FileTime::from_system_time(SystemTime::now() - Duration::from_secs(24 * 60 * 60))
}

fn rendered(outcome: &ReconcileOutcome) -> Vec<String> {
    outcome.plan.actions().iter().map(|a| a.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Content preservation and idempotence
// ---------------------------------------------------------------------------

#[rstest]
#[case::empty_output(&[], &[("A.java", "a"), ("pkg/B.java", "b")])]
#[case::everything_removed(&[("A.java", "a"), ("pkg/B.java", "b")], &[])]
#[case::rename(&[("Foo.java", "x")], &[("Bar.java", "x")])]
#[case::reshuffle(
    &[("a", "1"), ("b", "2"), ("c", "3"), ("d/e", "4")],
    &[("b", "1"), ("c", "2"), ("d", "3"), ("e/f/g", "4"), ("h", "5")]
)]
#[case::file_becomes_dir(&[("x", "old")], &[("x/y", "new")])]
#[case::dir_becomes_file(&[("x/y/z", "old")], &[("x", "new")])]
fn output_matches_desired_and_second_run_is_noop(
    #[case] before: &[(&str, &str)],
    #[case] desired: &[(&str, &str)],
) {
    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), before);

    sync(tmp.path(), tree(desired));
    assert_eq!(snapshot(tmp.path()), tree(desired));

    let (again, observer) = sync(tmp.path(), tree(desired));
    assert!(again.plan.is_noop(), "second plan: {:?}", rendered(&again));
    assert_eq!(observer.write_count(), 0);
    assert!(again.summary.expect("summary").is_noop());
}

#[test]
fn stale_files_are_deleted() {
    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), &[("keep.cs", "k"), ("old/Gone.cs", "g"), ("Gone2.cs", "g2")]);

    let (outcome, _) = sync(tmp.path(), tree(&[("keep.cs", "k")]));

    assert_eq!(outcome.plan.count(ActionKind::Deleted), 2);
    assert!(!tmp.path().join("old/Gone.cs").exists());
    assert!(!tmp.path().join("Gone2.cs").exists());
}

#[rstest]
#[case::modified_beside_lookalike(
    &[("b", "old"), ("b.dslc.tmp", "keep")],
    &[("b", "new"), ("b.dslc.tmp", "keep")]
)]
#[case::copy_beside_lookalike(&[], &[("a", "X"), ("c", "X"), ("c.dslc.tmp", "keep")])]
#[case::created_beside_lookalike(&[("n.dslc.tmp", "keep")], &[("n", "fresh"), ("n.dslc.tmp", "keep")])]
fn files_named_like_scratch_files_survive_writes_next_to_them(
    #[case] before: &[(&str, &str)],
    #[case] desired: &[(&str, &str)],
) {
    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), before);

    sync(tmp.path(), tree(desired));

    assert_eq!(snapshot(tmp.path()), tree(desired));
}

// ---------------------------------------------------------------------------
// No redundant writes
// ---------------------------------------------------------------------------

#[test]
fn unchanged_files_keep_their_mtime() {
    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), &[("same.ts", "same"), ("changed.ts", "before")]);
    let old = one_day_ago();
    set_file_mtime(tmp.path().join("same.ts"), old).expect("mtime");

    let (outcome, observer) = sync(
        tmp.path(),
        tree(&[("same.ts", "same"), ("changed.ts", "after")]),
    );

    let mtime = FileTime::from_last_modification_time(
        &fs::metadata(tmp.path().join("same.ts")).expect("meta"),
    );
    assert_eq!(mtime, old);
    assert!(!observer.wrote("same.ts"));
    assert!(observer.wrote("changed.ts"));
    assert_eq!(outcome.plan.count(ActionKind::Modified), 1);
}

#[test]
fn renamed_file_is_moved_not_rewritten() {
    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), &[("src/Foo.scala", "object X")]);
    let old = one_day_ago();
    set_file_mtime(tmp.path().join("src/Foo.scala"), old).expect("mtime");

    let (outcome, observer) = sync(tmp.path(), tree(&[("src/Bar.scala", "object X")]));

    assert_eq!(
        rendered(&outcome),
        vec!["MOVED src/Foo.scala -> src/Bar.scala"]
    );
    assert_eq!(observer.write_count(), 0);
    let mtime = FileTime::from_last_modification_time(
        &fs::metadata(tmp.path().join("src/Bar.scala")).expect("meta"),
    );
    assert_eq!(mtime, old, "rename keeps the original mtime");
}

#[test]
fn duplicate_content_is_written_once_then_copied() {
    let tmp = TempDir::new().expect("tmp");
    let (outcome, _) = sync(
        tmp.path(),
        tree(&[("a/Same.java", "dup"), ("b/Same.java", "dup"), ("c/Same.java", "dup")]),
    );

    assert_eq!(outcome.plan.count(ActionKind::Created), 1);
    assert_eq!(outcome.plan.count(ActionKind::Copy), 2);
    let created: Vec<_> = outcome
        .plan
        .actions()
        .iter()
        .filter_map(|a| match a {
            PathAction::Created { path, .. } => Some(path.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec!["a/Same.java"]);
}

// ---------------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------------

#[test]
fn vacated_directories_are_pruned_but_root_is_kept() {
    let tmp = TempDir::new().expect("tmp");
    let root = tmp.path().join("out");
    seed(&root, &[("deep/er/x.php", "x"), ("other/y.php", "y")]);

    let (outcome, _) = sync(&root, tree(&[("other/y.php", "y")]));

    assert!(!root.join("deep").exists());
    assert!(root.join("other").is_dir());
    assert_eq!(outcome.summary.expect("summary").dirs_removed, 2);

    sync(&root, Tree::new());
    assert!(root.is_dir(), "root itself is never pruned");
    assert!(snapshot(&root).is_empty());
}

// ---------------------------------------------------------------------------
// Exclusion
// ---------------------------------------------------------------------------

#[test]
fn excluded_paths_are_never_touched() {
    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), &[("deps.lock", "user"), ("gen/A.cs", "a")]);
    let options = ReconcileOptions {
        exclusions: ExclusionSet::from_globs(["*.lock"]).expect("glob"),
        ..ReconcileOptions::default()
    };

    let (outcome, observer) = sync_with(
        tmp.path(),
        tree(&[("deps.lock", "generated"), ("gen/B.cs", "b")]),
        options,
    );

    assert_eq!(fs::read_to_string(tmp.path().join("deps.lock")).expect("read"), "user");
    assert!(!observer.wrote("deps.lock"));
    assert_eq!(outcome.plan.count(ActionKind::Skipped), 1);
    assert_eq!(outcome.plan.actions()[0].kind(), ActionKind::Skipped);
}

// ---------------------------------------------------------------------------
// Cycles and determinism
// ---------------------------------------------------------------------------

#[test]
fn swap_cycle_reconciles_without_data_loss() {
    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), &[("a", "AAA"), ("b", "BBB")]);

    let (outcome, observer) = sync(tmp.path(), tree(&[("a", "BBB"), ("b", "AAA")]));

    assert_eq!(snapshot(tmp.path()), tree(&[("a", "BBB"), ("b", "AAA")]));
    assert_eq!(observer.write_count(), 0, "a swap needs only renames");
    assert_eq!(outcome.plan.count(ActionKind::Moved), 3);
}

#[test]
fn three_way_rotation_reconciles() {
    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), &[("x/1", "one"), ("x/2", "two"), ("x/3", "three")]);
    let desired = tree(&[("x/1", "three"), ("x/2", "one"), ("x/3", "two")]);

    sync(tmp.path(), desired.clone());
    assert_eq!(snapshot(tmp.path()), desired);
}

#[test]
fn entry_order_does_not_change_the_plan() {
    let old = ContentIndex::from_hashes(
        [("a", "1"), ("b", "2"), ("c", "3")]
            .iter()
            .map(|(p, c)| (RelativePath::parse(p).expect("path"), ContentHash::of(c.as_bytes()))),
    )
    .expect("old");

    let entries: Vec<FileEntry> = [("b", "1"), ("c", "1"), ("d", "2"), ("e", "4"), ("a", "3")]
        .iter()
        .map(|(p, c)| FileEntry::new(RelativePath::parse(p).expect("path"), c.as_bytes()))
        .collect();
    let mut reversed = entries.clone();
    reversed.reverse();

    let excluded = ExclusionSet::new();
    let forward = plan(&old, &ContentIndex::build(entries).expect("new"), &excluded);
    let backward = plan(&old, &ContentIndex::build(reversed).expect("new"), &excluded);
    assert_eq!(forward, backward);
}

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

#[rstest]
#[case("../escape.txt")]
#[case("a/../../escape.txt")]
fn escaping_names_are_rejected_before_any_io(#[case] name: &str) {
    let tmp = TempDir::new().expect("tmp");
    let root = tmp.path().join("out");
    let err = reconcile(
        &root,
        tree(&[(name, "x")]),
        ReconcileOptions::default(),
        &mut RecordingObserver::default(),
    )
    .unwrap_err();

    assert!(matches!(err, SyncError::OutOfRoot { .. }), "{err}");
    assert!(!tmp.path().join("escape.txt").exists());
}

#[test]
fn conflicting_spellings_of_one_path_are_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let err = reconcile(
        tmp.path(),
        tree(&[("a/b.txt", "one"), ("a//b.txt", "two")]),
        ReconcileOptions::default(),
        &mut RecordingObserver::default(),
    )
    .unwrap_err();

    assert!(matches!(err, SyncError::DuplicatePath { .. }), "{err}");
}

#[cfg(target_os = "linux")]
#[test]
fn non_utf8_output_names_abort_before_any_io() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), &[("keep.txt", "k")]);
    let stale = tmp.path().join(OsStr::from_bytes(b"stale\xff.txt"));
    fs::write(&stale, "old").expect("write");

    let err = reconcile(
        tmp.path(),
        tree(&[("keep.txt", "k"), ("new.txt", "n")]),
        ReconcileOptions::default(),
        &mut RecordingObserver::default(),
    )
    .unwrap_err();

    assert!(matches!(err, SyncError::InvalidPath { .. }), "{err}");
    assert!(stale.exists(), "unreadable name must not be reported as deleted");
    assert!(!tmp.path().join("new.txt").exists());
}

#[cfg(unix)]
#[test]
fn stale_files_with_backslash_names_are_deleted() {
    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), &[("keep.txt", "k")]);
    fs::create_dir_all(tmp.path().join("sub")).expect("mkdir");
    let stale = tmp.path().join("sub").join("back\\slash.txt");
    fs::write(&stale, "old").expect("write");

    let (outcome, _) = sync(tmp.path(), tree(&[("keep.txt", "k")]));

    assert!(rendered(&outcome).contains(&"DELETED sub/back\\slash.txt".to_string()));
    assert_eq!(outcome.plan.count(ActionKind::Deleted), 1);
    assert!(!stale.exists());
    assert!(!tmp.path().join("sub").exists());
}

#[test]
fn plan_serializes_with_action_tags_and_hex_hashes() {
    let tmp = TempDir::new().expect("tmp");
    seed(tmp.path(), &[("old.ts", "same")]);
    let options = ReconcileOptions {
        dry_run: true,
        ..ReconcileOptions::default()
    };
    let (outcome, _) = sync_with(tmp.path(), tree(&[("new.ts", "same")]), options);

    let json = serde_json::to_value(&outcome.plan).expect("json");
    let action = &json["actions"][0];
    assert_eq!(action["action"], "MOVED");
    assert_eq!(action["from"], "old.ts");
    assert_eq!(action["to"], "new.ts");
    assert_eq!(action["hash"], ContentHash::of(b"same").to_hex());
    assert!(tmp.path().join("old.ts").exists(), "dry run leaves the tree alone");
}
