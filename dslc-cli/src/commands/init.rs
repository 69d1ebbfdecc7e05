//! `dslc init [TARGET...]`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use dslc_core::config;

/// Write a `dslc.yaml` for the given targets.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Target names (see `dslc targets`).
    pub targets: Vec<String>,
}

impl InitArgs {
    pub fn run(self, project_dir: &Path) -> Result<()> {
        let config = config::init_at(project_dir, &self.targets).with_context(|| {
            format!("failed to init project in '{}'", project_dir.display())
        })?;

        println!(
            "✓ Wrote {}",
            config::config_path_at(project_dir).display()
        );
        println!("  output:  {}", config.output.display());
        println!("  staging: {}", config.staging.display());
        for rule in &config.manifests {
            println!(
                "  manifest {} -> {}",
                rule.pattern,
                rule.destination.display()
            );
        }
        Ok(())
    }
}
