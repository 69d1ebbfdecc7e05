//! Shared reconcile entrypoint used by the CLI.
//!
//! Loads the current output tree, plans against the desired generation
//! result, applies the plan and finally writes the project manifests, which
//! bypass reconciliation entirely.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dslc_core::{ManifestRule, RelativePath};

use crate::apply::{self, AppliedSummary, ApplyOptions};
use crate::error::{io_err, SyncError};
use crate::exclude::ExclusionSet;
use crate::index::{ContentHash, ContentIndex};
use crate::loader;
use crate::observer::ApplyObserver;
use crate::plan::{self, ReconciliationPlan};

/// Inputs to [`reconcile`] besides the root and the desired set.
#[derive(Debug, Default)]
pub struct ReconcileOptions {
    pub exclusions: ExclusionSet,
    pub manifests: Vec<ManifestRule>,
    /// Base for relative manifest destinations; the output root when `None`.
    pub manifest_dir: Option<PathBuf>,
    /// Plan only; touch nothing on disk.
    pub dry_run: bool,
    pub apply: ApplyOptions,
}

/// Outcome of a single manifest rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestWrite {
    /// File was written (content changed or did not previously exist).
    Written { source: RelativePath, path: PathBuf },
    /// File already held exactly these bytes.
    Unchanged { source: RelativePath, path: PathBuf },
    /// `--dry-run` mode: the file *would* have been written.
    WouldWrite { source: RelativePath, path: PathBuf },
}

impl ManifestWrite {
    pub fn path(&self) -> &Path {
        match self {
            Self::Written { path, .. }
            | Self::Unchanged { path, .. }
            | Self::WouldWrite { path, .. } => path,
        }
    }
}

/// Everything a caller needs to report on a reconcile run.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub plan: ReconciliationPlan,
    /// `None` in dry-run mode.
    pub summary: Option<AppliedSummary>,
    pub manifests: Vec<ManifestWrite>,
}

/// Reconcile the tree under `root` with `desired` (`relative name -> bytes`).
pub fn reconcile(
    root: &Path,
    desired: BTreeMap<String, Vec<u8>>,
    options: ReconcileOptions,
    observer: &mut dyn ApplyObserver,
) -> Result<ReconcileOutcome, SyncError> {
    let ReconcileOptions {
        mut exclusions,
        manifests,
        manifest_dir,
        dry_run,
        apply: apply_options,
    } = options;

    if !dry_run {
        apply::create_dir_with_retry(root, &apply_options)?;
    }

    let entries = loader::clean_entries(desired)?;

    // Resolve manifest sources before the entries move into the index.
    let manifest_dir = manifest_dir.unwrap_or_else(|| root.to_path_buf());
    let mut pending = Vec::new();
    for rule in &manifests {
        let matcher = ExclusionSet::from_globs([rule.pattern.as_str()])?;
        exclusions = exclusions.with_glob(&rule.pattern)?;

        let destination = manifest_dir.join(&rule.destination);
        if let Ok(inside) = destination.strip_prefix(root) {
            // Keep the planner away from a manifest that lives in the output tree.
            if let Ok(relative) = RelativePath::from_native(inside) {
                exclusions = exclusions.with_predicate(move |p| *p == relative);
            }
        }

        match entries.iter().find(|e| matcher.matches(&e.path)) {
            Some(entry) => pending.push((entry.path.clone(), entry.content.clone(), destination)),
            None => tracing::debug!("no generated file matches manifest pattern {}", rule.pattern),
        }
    }

    let old = ContentIndex::from_hashes(loader::hash_tree(root)?)?;
    let new = ContentIndex::build(entries)?;
    let plan = plan::plan(&old, &new, &exclusions);
    tracing::debug!(
        "planned {} action(s) for {} ({} old / {} new path(s))",
        plan.len(),
        root.display(),
        old.len(),
        new.len()
    );

    let summary = if dry_run {
        None
    } else {
        Some(apply::apply(&plan, root, &apply_options, observer)?)
    };

    let mut written = Vec::with_capacity(pending.len());
    for (source, content, path) in pending {
        written.push(write_manifest(source, &content, path, dry_run, &apply_options)?);
    }

    Ok(ReconcileOutcome {
        plan,
        summary,
        manifests: written,
    })
}

/// Hash-gated atomic write of one manifest file.
fn write_manifest(
    source: RelativePath,
    content: &[u8],
    path: PathBuf,
    dry_run: bool,
    options: &ApplyOptions,
) -> Result<ManifestWrite, SyncError> {
    let unchanged = match std::fs::read(&path) {
        Ok(existing) => ContentHash::of(&existing) == ContentHash::of(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(io_err(&path, e)),
    };

    if unchanged {
        tracing::debug!("manifest unchanged: {}", path.display());
        return Ok(ManifestWrite::Unchanged { source, path });
    }
    if dry_run {
        return Ok(ManifestWrite::WouldWrite { source, path });
    }

    if let Some(parent) = path.parent() {
        apply::create_dir_with_retry(parent, options)?;
    }
    apply::write_atomic(&path, content)?;
    tracing::info!("wrote manifest: {} (from {source})", path.display());
    Ok(ManifestWrite::Written { source, path })
}
