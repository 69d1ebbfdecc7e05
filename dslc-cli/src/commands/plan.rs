//! `dslc plan` — show the reconciliation plan without applying it.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use dslc_sync::{reconcile, ActionKind, NoopObserver, PathAction, ReconciliationPlan};

use super::TreeArgs;

/// Arguments for `dslc plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub trees: TreeArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PlanJson<'a> {
    output: String,
    counts: BTreeMap<ActionKind, usize>,
    #[serde(flatten)]
    plan: &'a ReconciliationPlan,
}

impl PlanArgs {
    pub fn run(self, project_dir: &Path) -> Result<()> {
        let prepared = self.trees.prepare(project_dir, true)?;
        let outcome = reconcile(
            &prepared.output,
            prepared.desired,
            prepared.options,
            &mut NoopObserver,
        )
        .with_context(|| format!("failed to plan '{}'", prepared.output.display()))?;

        if self.json {
            let report = PlanJson {
                output: prepared.output.display().to_string(),
                counts: outcome.plan.counts(),
                plan: &outcome.plan,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        print_plan(&outcome.plan, "");
        Ok(())
    }
}

/// Print every state-changing action, then a one-line tally.
pub fn print_plan(plan: &ReconciliationPlan, prefix: &str) {
    if plan.is_noop() {
        println!("{prefix}No changes.");
        return;
    }

    for action in plan.actions() {
        if let Some(line) = action_line(action) {
            println!("{prefix}  {line}");
        }
    }

    let tally: Vec<String> = plan
        .counts()
        .into_iter()
        .filter(|(kind, _)| !matches!(kind, ActionKind::NoChange | ActionKind::Skipped))
        .map(|(kind, n)| format!("{n} {}", kind.to_string().to_lowercase()))
        .collect();
    println!("{prefix}{}", tally.join(", "));
}

fn action_line(action: &PathAction) -> Option<String> {
    let text = action.to_string();
    let line = match action.kind() {
        ActionKind::NoChange | ActionKind::Skipped => return None,
        ActionKind::Created | ActionKind::Copy => text.green(),
        ActionKind::Modified => text.yellow(),
        ActionKind::Moved => text.cyan(),
        ActionKind::Deleted => text.red(),
        ActionKind::CreatedDir | ActionKind::DeletedDir => text.bright_black(),
    };
    Some(line.to_string())
}
