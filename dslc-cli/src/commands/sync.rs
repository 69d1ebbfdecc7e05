//! `dslc sync` — reconcile the output tree, then run the post-sync hook.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use clap::Args;

use dslc_sync::{reconcile, AppliedSummary, LogObserver, ManifestWrite};

use super::plan::print_plan;
use super::TreeArgs;

/// Arguments for `dslc sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub trees: TreeArgs,

    /// Show what would change without touching anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the `post_sync` command from `dslc.yaml`.
    #[arg(long)]
    pub no_build: bool,
}

impl SyncArgs {
    pub fn run(self, project_dir: &Path) -> Result<()> {
        let prepared = self.trees.prepare(project_dir, self.dry_run)?;
        let output = prepared.output;
        let outcome = reconcile(&output, prepared.desired, prepared.options, &mut LogObserver)
            .with_context(|| format!("sync failed for '{}'", output.display()))?;

        if self.dry_run {
            print_plan(&outcome.plan, "[dry-run] ");
            print_manifests(&outcome.manifests, "[dry-run] ");
            return Ok(());
        }

        match &outcome.summary {
            Some(summary) if !summary.is_noop() => print_summary(&output, summary),
            _ => println!("No changes."),
        }
        print_manifests(&outcome.manifests, "");

        if self.no_build {
            tracing::debug!("--no-build: skipping post-sync command");
            return Ok(());
        }
        run_post_sync(&prepared.config.post_sync, &output)
    }
}

fn print_summary(output: &Path, summary: &AppliedSummary) {
    println!(
        "✓ '{}' synced ({} created, {} modified, {} moved, {} copied, {} deleted)",
        output.display(),
        summary.created,
        summary.modified,
        summary.moved,
        summary.copied,
        summary.deleted,
    );
    if summary.prune_failures > 0 {
        println!(
            "  {} director{} could not be removed",
            summary.prune_failures,
            if summary.prune_failures == 1 { "y" } else { "ies" }
        );
    }
}

fn print_manifests(manifests: &[ManifestWrite], prefix: &str) {
    for m in manifests {
        match m {
            ManifestWrite::Written { path, .. } => println!("{prefix}  ✎  {}", path.display()),
            ManifestWrite::WouldWrite { path, .. } => println!("{prefix}  ~  {}", path.display()),
            ManifestWrite::Unchanged { path, .. } => println!("{prefix}  ·  {}", path.display()),
        }
    }
}

/// Run `argv` in `dir`; a non-zero exit is an error.
fn run_post_sync(argv: &[String], dir: &Path) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        return Ok(());
    };

    tracing::info!("running post-sync command: {}", argv.join(" "));
    let status = Command::new(program)
        .args(args)
        .current_dir(dir)
        .status()
        .with_context(|| format!("failed to start post-sync command '{program}'"))?;
    if !status.success() {
        anyhow::bail!("post-sync command '{}' failed ({status})", argv.join(" "));
    }
    Ok(())
}
