//! Subcommands, plus the project loading shared by `plan` and `sync`.

pub mod init;
pub mod plan;
pub mod sync;
pub mod targets;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use dslc_core::{config, ConfigError, ProjectConfig};
use dslc_sync::{loader, ApplyOptions, ExclusionSet, ReconcileOptions};

/// Overrides for the trees named in `dslc.yaml`.
#[derive(Args, Debug, Clone, Default)]
pub struct TreeArgs {
    /// Directory holding the freshly generated files.
    #[arg(long, value_name = "DIR")]
    pub staging: Option<PathBuf>,

    /// Output root to reconcile.
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Extra glob of output paths to leave alone (repeatable).
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,
}

/// Everything needed to call `dslc_sync::reconcile` for one project.
pub struct Prepared {
    pub config: ProjectConfig,
    pub output: PathBuf,
    pub desired: BTreeMap<String, Vec<u8>>,
    pub options: ReconcileOptions,
}

impl TreeArgs {
    /// Load config (defaults when there is none), then the staged files.
    pub fn prepare(&self, project_dir: &Path, dry_run: bool) -> Result<Prepared> {
        let config = load_config(project_dir)?;

        let staging = match &self.staging {
            Some(dir) => dir.clone(),
            None => config.staging_dir(project_dir),
        };
        let output = match &self.output {
            Some(dir) => dir.clone(),
            None => config.output_dir(project_dir),
        };
        if !staging.is_dir() {
            anyhow::bail!(
                "staging directory '{}' does not exist; run the compiler first or pass --staging",
                staging.display()
            );
        }

        let desired: BTreeMap<String, Vec<u8>> = loader::load_tree(&staging)
            .with_context(|| format!("failed to read staging directory '{}'", staging.display()))?
            .into_iter()
            .map(|entry| (entry.path.to_string(), entry.content))
            .collect();
        tracing::debug!(
            "{} generated file(s) in {}",
            desired.len(),
            staging.display()
        );

        let exclusions = ExclusionSet::from_globs(config.exclude.iter().chain(&self.exclude))
            .context("invalid exclusion pattern")?;
        let options = ReconcileOptions {
            exclusions,
            manifests: config.manifests.clone(),
            manifest_dir: Some(project_dir.to_path_buf()),
            dry_run,
            apply: ApplyOptions {
                dir_retries: config.dir_retries,
                retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            },
        };

        Ok(Prepared {
            config,
            output,
            desired,
            options,
        })
    }
}

fn load_config(project_dir: &Path) -> Result<ProjectConfig> {
    match config::load_at(project_dir) {
        Ok(config) => {
            tracing::debug!("loaded {}", config::config_path_at(project_dir).display());
            Ok(config)
        }
        Err(ConfigError::NotFound { path }) => {
            tracing::debug!("no {}; using defaults", path.display());
            Ok(ProjectConfig::default())
        }
        Err(e) => Err(e).context("failed to load project config"),
    }
}
