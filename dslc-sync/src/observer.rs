//! Progress reporting for [`apply`](crate::apply::apply).
//!
//! The applier never logs through shared state; callers pass an observer by
//! `&mut` and get told what happens as it happens.

use dslc_core::RelativePath;

use crate::plan::{ActionKind, PathAction};

/// Receives apply progress. Every method defaults to a no-op.
pub trait ApplyObserver {
    /// Called before an action executes.
    fn action_started(&mut self, _action: &PathAction) {}

    /// Called after bytes were physically written at `path`.
    fn bytes_written(&mut self, _path: &RelativePath, _len: u64) {}

    /// Called when a directory could not be pruned; apply carries on.
    fn prune_failed(&mut self, _dir: &RelativePath, _reason: &str) {}
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ApplyObserver for NoopObserver {}

/// Logs every state-changing action at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ApplyObserver for LogObserver {
    fn action_started(&mut self, action: &PathAction) {
        match action.kind() {
            ActionKind::NoChange | ActionKind::Skipped => tracing::debug!("{action}"),
            _ => tracing::info!("{action}"),
        }
    }

    fn prune_failed(&mut self, dir: &RelativePath, reason: &str) {
        tracing::warn!("could not prune {dir}: {reason}");
    }
}

/// Keeps a record of everything it is told.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub started: Vec<ActionKind>,
    pub writes: Vec<(RelativePath, u64)>,
    pub prune_failures: Vec<RelativePath>,
}

impl RecordingObserver {
    /// Number of physical content writes.
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    pub fn wrote(&self, path: &str) -> bool {
        self.writes.iter().any(|(p, _)| p.as_str() == path)
    }
}

impl ApplyObserver for RecordingObserver {
    fn action_started(&mut self, action: &PathAction) {
        self.started.push(action.kind());
    }

    fn bytes_written(&mut self, path: &RelativePath, len: u64) {
        self.writes.push((path.clone(), len));
    }

    fn prune_failed(&mut self, dir: &RelativePath, _reason: &str) {
        self.prune_failures.push(dir.clone());
    }
}
