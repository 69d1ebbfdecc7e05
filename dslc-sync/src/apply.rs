//! Applier — executes a [`ReconciliationPlan`] against an output root.
//!
//! ## Failure policy
//!
//! - Paths are confined to `root`; anything resolving elsewhere (including
//!   through a symlinked directory) is refused before touching it.
//! - Parent directories are created on demand, retried a bounded number of
//!   times with exponential backoff.
//! - Content writes go to a uniquely named scratch file in the destination's
//!   directory first and are renamed into place.
//! - `DELETED_DIR` failures are reported and skipped. Any other failure
//!   aborts the remaining plan.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use serde::Serialize;
use tempfile::NamedTempFile;

use dslc_core::RelativePath;

use crate::error::{io_err, SyncError};
use crate::index::ContentHash;
use crate::observer::ApplyObserver;
use crate::plan::{PathAction, ReconciliationPlan};

// ---------------------------------------------------------------------------
// Options and summary
// ---------------------------------------------------------------------------

/// Tuning knobs for [`apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Extra attempts after a failed directory creation.
    pub dir_retries: u32,
    /// Delay before the first retry; doubles (with jitter) afterwards.
    pub retry_backoff: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dir_retries: 3,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

/// What an [`apply`] run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedSummary {
    pub created: usize,
    pub modified: usize,
    pub moved: usize,
    pub copied: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub dirs_created: usize,
    pub dirs_removed: usize,
    pub prune_failures: usize,
    pub bytes_written: u64,
}

impl AppliedSummary {
    /// Files whose content or location changed.
    pub fn files_changed(&self) -> usize {
        self.created + self.modified + self.moved + self.copied + self.deleted
    }

    pub fn is_noop(&self) -> bool {
        self.files_changed() == 0 && self.dirs_created == 0 && self.dirs_removed == 0
    }
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Execute `plan` under `root`, in order.
///
/// Returns at the first fatal failure; the error names the path involved so
/// the caller can report how far reconciliation got.
pub fn apply(
    plan: &ReconciliationPlan,
    root: &Path,
    options: &ApplyOptions,
    observer: &mut dyn ApplyObserver,
) -> Result<AppliedSummary, SyncError> {
    // Fail fast on anything that would land outside the root.
    for action in plan.actions() {
        for path in action.source().into_iter().chain(action.destination()) {
            resolve(root, path)?;
        }
    }

    let mut summary = AppliedSummary::default();
    for action in plan.actions() {
        observer.action_started(action);
        execute(action, root, options, observer, &mut summary)?;
    }

    tracing::debug!(
        "applied {} action(s) under {}: {} file(s) changed",
        plan.len(),
        root.display(),
        summary.files_changed()
    );
    Ok(summary)
}

fn execute(
    action: &PathAction,
    root: &Path,
    options: &ApplyOptions,
    observer: &mut dyn ApplyObserver,
    summary: &mut AppliedSummary,
) -> Result<(), SyncError> {
    match action {
        PathAction::NoChange { .. } => summary.unchanged += 1,
        PathAction::Skipped { .. } => summary.skipped += 1,

        PathAction::CreatedDir { path } => {
            let dir = resolve_checked(root, path)?;
            if create_dir_with_retry(&dir, options)? {
                summary.dirs_created += 1;
            }
        }

        PathAction::Deleted { path } => {
            let native = resolve_checked(root, path)?;
            match std::fs::remove_file(&native) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("already gone: {}", native.display());
                }
                Err(e) => return Err(io_err(&native, e)),
            }
            summary.deleted += 1;
        }

        PathAction::Moved {
            from,
            to,
            hash,
            overwrites,
        } => {
            let source = resolve_checked(root, from)?;
            let dest = resolve_checked(root, to)?;
            let unexpected = prepare_destination(&dest, *overwrites, options)?;
            if let Some(len) = move_file(&source, &dest)? {
                observer.bytes_written(to, len);
                summary.bytes_written += len;
            }
            if unexpected {
                verify(&dest, hash)?;
            }
            summary.moved += 1;
        }

        PathAction::Copy {
            from,
            to,
            hash,
            overwrites,
        } => {
            let source = resolve_checked(root, from)?;
            let dest = resolve_checked(root, to)?;
            let unexpected = prepare_destination(&dest, *overwrites, options)?;
            let len = copy_atomic(&source, &dest)?;
            observer.bytes_written(to, len);
            summary.bytes_written += len;
            if unexpected {
                verify(&dest, hash)?;
            }
            summary.copied += 1;
        }

        PathAction::Created {
            path,
            hash,
            content,
        } => {
            let dest = resolve_checked(root, path)?;
            let unexpected = prepare_destination(&dest, false, options)?;
            write_atomic(&dest, content)?;
            observer.bytes_written(path, content.len() as u64);
            summary.bytes_written += content.len() as u64;
            if unexpected {
                verify(&dest, hash)?;
            }
            summary.created += 1;
        }

        PathAction::Modified { path, content, .. } => {
            let dest = resolve_checked(root, path)?;
            prepare_destination(&dest, true, options)?;
            write_atomic(&dest, content)?;
            observer.bytes_written(path, content.len() as u64);
            summary.bytes_written += content.len() as u64;
            summary.modified += 1;
        }

        PathAction::DeletedDir { path } => {
            let dir = resolve(root, path)?;
            prune_upward(root, path, &dir, observer, summary);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Path confinement
// ---------------------------------------------------------------------------

/// Join `relative` under `root`, refusing anything that leaves it lexically.
fn resolve(root: &Path, relative: &RelativePath) -> Result<PathBuf, SyncError> {
    let native = relative.to_native(root);
    let confined = native
        .strip_prefix(root)
        .map(|tail| {
            tail.components().count() > 0
                && tail.components().all(|c| matches!(c, Component::Normal(_)))
        })
        .unwrap_or(false);
    if !confined {
        return Err(SyncError::OutOfRoot {
            path: relative.to_string(),
        });
    }
    Ok(native)
}

/// [`resolve`], plus a check that no existing parent under `root` is a
/// symlink that could redirect the operation elsewhere.
fn resolve_checked(root: &Path, relative: &RelativePath) -> Result<PathBuf, SyncError> {
    let native = resolve(root, relative)?;
    for dir in relative.ancestors() {
        let dir_native = dir.to_native(root);
        if let Ok(meta) = std::fs::symlink_metadata(&dir_native) {
            if meta.file_type().is_symlink() {
                return Err(SyncError::OutOfRoot {
                    path: relative.to_string(),
                });
            }
        }
    }
    Ok(native)
}

// ---------------------------------------------------------------------------
// Filesystem primitives
// ---------------------------------------------------------------------------

/// Create `dir` and its parents, retrying transient failures.
///
/// Returns `true` when the directory did not exist before.
pub(crate) fn create_dir_with_retry(dir: &Path, options: &ApplyOptions) -> Result<bool, SyncError> {
    if dir.is_dir() {
        return Ok(false);
    }

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(options.retry_backoff)
        .with_max_elapsed_time(None)
        .build();
    let mut attempts = 0u32;
    let result = backoff::retry(policy, || {
        attempts += 1;
        match std::fs::create_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(e)
                if attempts > options.dir_retries
                    || matches!(e.kind(), ErrorKind::PermissionDenied | ErrorKind::AlreadyExists) =>
            {
                Err(backoff::Error::permanent(e))
            }
            Err(e) => {
                tracing::debug!(
                    "mkdir {} failed (attempt {attempts}): {e}; retrying",
                    dir.display()
                );
                Err(backoff::Error::transient(e))
            }
        }
    });

    match result {
        Ok(()) => Ok(true),
        Err(backoff::Error::Permanent(e)) | Err(backoff::Error::Transient { err: e, .. }) => {
            Err(io_err(dir, e))
        }
    }
}

/// Make `dest` writable: parents exist and no empty directory sits in the way.
///
/// Returns `true` when a file already exists at `dest` although the planner
/// did not expect one, so the result must be verified.
fn prepare_destination(
    dest: &Path,
    expected_existing: bool,
    options: &ApplyOptions,
) -> Result<bool, SyncError> {
    if let Some(parent) = dest.parent() {
        create_dir_with_retry(parent, options)?;
    }

    match std::fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => {
            if !remove_empty_tree(dest).map_err(|e| io_err(dest, e))? {
                return Err(io_err(
                    dest,
                    std::io::Error::other("destination is a non-empty directory"),
                ));
            }
            Ok(false)
        }
        Ok(_) => {
            if !expected_existing {
                tracing::warn!(
                    "{} appeared since the tree was indexed; verifying after write",
                    dest.display()
                );
            }
            Ok(!expected_existing)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(dest, e)),
    }
}

/// Remove `dir` if it holds nothing but (nested) empty directories.
fn remove_empty_tree(dir: &Path) -> std::io::Result<bool> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() || !remove_empty_tree(&entry.path())? {
            return Ok(false);
        }
    }
    std::fs::remove_dir(dir)?;
    Ok(true)
}

/// Exclusively created scratch file with a random name next to `dest`.
/// Removed on drop unless persisted.
fn scratch_for(dest: &Path) -> Result<NamedTempFile, SyncError> {
    let dir = match dest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".dslc-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| io_err(dir, e))
}

/// Give the scratch file the permissions of `like` when it exists, otherwise
/// those of a regular file.
fn fit_permissions(scratch: &NamedTempFile, like: &Path) -> Result<(), SyncError> {
    let permissions = match std::fs::metadata(like) {
        Ok(meta) if meta.is_file() => Some(meta.permissions()),
        _ => regular_file_permissions(),
    };
    match permissions {
        Some(p) => scratch
            .as_file()
            .set_permissions(p)
            .map_err(|e| io_err(scratch.path(), e)),
        None => Ok(()),
    }
}

#[cfg(unix)]
fn regular_file_permissions() -> Option<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn regular_file_permissions() -> Option<std::fs::Permissions> {
    None
}

fn persist(scratch: NamedTempFile, dest: &Path) -> Result<(), SyncError> {
    scratch
        .persist(dest)
        .map(drop)
        .map_err(|e| io_err(dest, e.error))
}

/// Write `content` to a scratch file beside `path`, then rename onto `path`.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), SyncError> {
    let mut scratch = scratch_for(path)?;
    scratch
        .write_all(content)
        .map_err(|e| io_err(scratch.path(), e))?;
    fit_permissions(&scratch, path)?;
    persist(scratch, path)
}

/// Copy `from` to a scratch file beside `to`, then rename onto `to`.
/// Returns bytes copied.
fn copy_atomic(from: &Path, to: &Path) -> Result<u64, SyncError> {
    let mut source = File::open(from).map_err(|e| io_err(from, e))?;
    let mut scratch = scratch_for(to)?;
    let len = std::io::copy(&mut source, scratch.as_file_mut()).map_err(|e| io_err(from, e))?;
    fit_permissions(&scratch, from)?;
    persist(scratch, to)?;
    Ok(len)
}

/// Rename `from` onto `to`, copying when rename cannot but the source is
/// still there (e.g. across devices).
///
/// Returns the number of bytes written when the copy fallback was used.
fn move_file(from: &Path, to: &Path) -> Result<Option<u64>, SyncError> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(None),
        Err(e) if is_cross_device(&e) || from.is_file() => {
            tracing::debug!(
                "rename {} -> {} failed ({e}); copying instead",
                from.display(),
                to.display()
            );
            let len = copy_atomic(from, to)?;
            std::fs::remove_file(from).map_err(|e| io_err(from, e))?;
            Ok(Some(len))
        }
        Err(e) => Err(io_err(from, e)),
    }
}

#[cfg(unix)]
fn is_cross_device(err: &std::io::Error) -> bool {
    const EXDEV: i32 = 18;
    err.raw_os_error() == Some(EXDEV)
}

#[cfg(windows)]
fn is_cross_device(err: &std::io::Error) -> bool {
    const ERROR_NOT_SAME_DEVICE: i32 = 17;
    err.raw_os_error() == Some(ERROR_NOT_SAME_DEVICE)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_err: &std::io::Error) -> bool {
    false
}

/// Re-hash `path` and compare with what the plan intended to put there.
fn verify(path: &Path, expected: &ContentHash) -> Result<(), SyncError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let actual = ContentHash::of(&bytes);
    if actual != *expected {
        return Err(SyncError::Verification {
            path: path.to_path_buf(),
            expected: *expected,
            actual,
        });
    }
    Ok(())
}

/// Remove `dir` and then each parent while empty, stopping at `root`.
///
/// Best effort: problems are logged and reported, never returned.
fn prune_upward(
    root: &Path,
    relative: &RelativePath,
    dir: &Path,
    observer: &mut dyn ApplyObserver,
    summary: &mut AppliedSummary,
) {
    let mut current = Some(relative.clone());
    let mut native = dir.to_path_buf();
    let mut first = true;

    while let Some(rel) = current {
        if native == root || !native.starts_with(root) {
            break;
        }
        match std::fs::read_dir(&native) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    if first {
                        let reason = "directory is not empty";
                        tracing::warn!("not pruning {}: {reason}", native.display());
                        observer.prune_failed(&rel, reason);
                        summary.prune_failures += 1;
                    } else {
                        tracing::debug!("stop pruning at {}: still in use", native.display());
                    }
                    break;
                }
                if let Err(e) = std::fs::remove_dir(&native) {
                    tracing::warn!("could not remove {}: {e}", native.display());
                    observer.prune_failed(&rel, &e.to_string());
                    summary.prune_failures += 1;
                    break;
                }
                tracing::debug!("pruned {}", native.display());
                summary.dirs_removed += 1;
            }
            // Already removed while pruning a sibling; keep walking up.
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("could not inspect {}: {e}", native.display());
                observer.prune_failed(&rel, &e.to_string());
                summary.prune_failures += 1;
                break;
            }
        }

        first = false;
        current = rel.parent();
        native = match native.parent() {
            Some(parent) => parent.to_path_buf(),
            None => break,
        };
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
