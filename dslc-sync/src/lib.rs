//! # dslc-sync
//!
//! Content-addressed reconciliation of a generated output tree.
//!
//! Call [`reconcile`] to bring a directory in line with a fresh generation
//! result, or drive the stages yourself:
//!
//! 1. [`loader`] reads trees and cleans generated file names,
//! 2. [`ContentIndex`] buckets paths by SHA-256 digest,
//! 3. [`plan()`] diffs two indexes into a [`ReconciliationPlan`],
//! 4. [`apply()`] executes the plan, reporting to an [`ApplyObserver`].

pub mod apply;
pub mod error;
pub mod exclude;
pub mod index;
pub mod loader;
pub mod observer;
pub mod pipeline;
pub mod plan;

pub use apply::{apply, AppliedSummary, ApplyOptions};
pub use error::SyncError;
pub use exclude::ExclusionSet;
pub use index::{ContentHash, ContentIndex};
pub use observer::{ApplyObserver, LogObserver, NoopObserver, RecordingObserver};
pub use pipeline::{reconcile, ManifestWrite, ReconcileOptions, ReconcileOutcome};
pub use plan::{plan, ActionKind, PathAction, ReconciliationPlan};
