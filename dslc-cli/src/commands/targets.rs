//! `dslc targets` — the static target table.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use dslc_core::Target;

/// Arguments for `dslc targets`.
#[derive(Args, Debug)]
pub struct TargetsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct TargetJson {
    name: &'static str,
    description: &'static str,
    extension: Option<&'static str>,
    build: Option<&'static str>,
    dependencies: &'static [&'static str],
    artifact: Option<&'static str>,
}

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "target")]
    name: &'static str,
    #[tabled(rename = "description")]
    description: &'static str,
    #[tabled(rename = "ext")]
    extension: &'static str,
    #[tabled(rename = "build")]
    build: &'static str,
    #[tabled(rename = "artifact")]
    artifact: &'static str,
}

impl TargetsArgs {
    pub fn run(self) -> Result<()> {
        if self.json {
            let rows: Vec<TargetJson> = Target::all()
                .iter()
                .map(|t| TargetJson {
                    name: t.name,
                    description: t.description,
                    extension: t.extension,
                    build: t.build.program(),
                    dependencies: t.dependencies,
                    artifact: t.artifact,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        let rows = Target::all().iter().map(|t| TargetRow {
            name: t.name,
            description: t.description,
            extension: t.extension.unwrap_or("-"),
            build: t.build.program().unwrap_or("-"),
            artifact: t.artifact.unwrap_or("-"),
        });
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
