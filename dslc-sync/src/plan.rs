//! Reconciliation planner.
//!
//! Compares the content index of the existing output tree (`old`) with the
//! index of the desired tree (`new`) and produces an ordered list of
//! [`PathAction`]s. Execution order is part of the contract:
//!
//! 1. `SKIPPED` / `NO_CHANGE` (nothing to do)
//! 2. `DELETED`
//! 3. `MOVED`, sources vacated before anything moves onto them
//! 4. `CREATED` / `MODIFIED`, then `COPY`
//! 5. `DELETED_DIR`, deepest first
//!
//! `CREATED_DIR` entries appear inline, right before the first action that
//! needs the directory. Every tie is broken by relative path so identical
//! inputs always give identical plans.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use dslc_core::RelativePath;

use crate::exclude::ExclusionSet;
use crate::index::{ContentHash, ContentIndex};

/// Suffix of temporary names used to break move cycles.
pub const MOVE_TMP_SUFFIX: &str = ".dslc-tmp";

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// One step of a reconciliation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathAction {
    NoChange {
        path: RelativePath,
    },
    /// Write new bytes at a path that holds nothing the planner knows of.
    Created {
        path: RelativePath,
        hash: ContentHash,
        #[serde(skip)]
        content: Arc<[u8]>,
    },
    /// Replace the bytes at a path whose old content is no longer wanted.
    Modified {
        path: RelativePath,
        hash: ContentHash,
        #[serde(skip)]
        content: Arc<[u8]>,
    },
    /// Rename without rewriting content.
    Moved {
        from: RelativePath,
        to: RelativePath,
        hash: ContentHash,
        /// Destination held unwanted content that the move replaces.
        overwrites: bool,
    },
    /// Duplicate bytes already on disk at `from`.
    Copy {
        from: RelativePath,
        to: RelativePath,
        hash: ContentHash,
        overwrites: bool,
    },
    Deleted {
        path: RelativePath,
    },
    CreatedDir {
        path: RelativePath,
    },
    /// Remove `path` if empty, then each empty parent up to the root.
    DeletedDir {
        path: RelativePath,
    },
    Skipped {
        path: RelativePath,
    },
}

/// Discriminant of [`PathAction`], for counting and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    NoChange,
    Created,
    Modified,
    Moved,
    Copy,
    Deleted,
    CreatedDir,
    DeletedDir,
    Skipped,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoChange => "NO_CHANGE",
            Self::Created => "CREATED",
            Self::Modified => "MODIFIED",
            Self::Moved => "MOVED",
            Self::Copy => "COPY",
            Self::Deleted => "DELETED",
            Self::CreatedDir => "CREATED_DIR",
            Self::DeletedDir => "DELETED_DIR",
            Self::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

impl PathAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::NoChange { .. } => ActionKind::NoChange,
            Self::Created { .. } => ActionKind::Created,
            Self::Modified { .. } => ActionKind::Modified,
            Self::Moved { .. } => ActionKind::Moved,
            Self::Copy { .. } => ActionKind::Copy,
            Self::Deleted { .. } => ActionKind::Deleted,
            Self::CreatedDir { .. } => ActionKind::CreatedDir,
            Self::DeletedDir { .. } => ActionKind::DeletedDir,
            Self::Skipped { .. } => ActionKind::Skipped,
        }
    }

    /// Path read from, if any.
    pub fn source(&self) -> Option<&RelativePath> {
        match self {
            Self::Moved { from, .. } | Self::Copy { from, .. } => Some(from),
            Self::NoChange { path }
            | Self::Modified { path, .. }
            | Self::Deleted { path }
            | Self::DeletedDir { path }
            | Self::Skipped { path } => Some(path),
            Self::Created { .. } | Self::CreatedDir { .. } => None,
        }
    }

    /// Path written to, if any.
    pub fn destination(&self) -> Option<&RelativePath> {
        match self {
            Self::Moved { to, .. } | Self::Copy { to, .. } => Some(to),
            Self::NoChange { path }
            | Self::Created { path, .. }
            | Self::Modified { path, .. }
            | Self::CreatedDir { path }
            | Self::Skipped { path } => Some(path),
            Self::Deleted { .. } | Self::DeletedDir { .. } => None,
        }
    }
}

impl fmt::Display for PathAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Moved { from, to, .. } | Self::Copy { from, to, .. } => {
                write!(f, "{} {from} -> {to}", self.kind())
            }
            other => match other.destination().or_else(|| other.source()) {
                Some(path) => write!(f, "{} {path}", other.kind()),
                None => write!(f, "{}", other.kind()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Ordered actions; apply front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    actions: Vec<PathAction>,
}

impl ReconciliationPlan {
    /// A plan made of hand-picked actions, applied in the given order.
    pub fn from_actions(actions: Vec<PathAction>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[PathAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// `true` when applying would touch nothing.
    pub fn is_noop(&self) -> bool {
        self.actions
            .iter()
            .all(|a| matches!(a.kind(), ActionKind::NoChange | ActionKind::Skipped))
    }

    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind() == kind).count()
    }

    /// Per-kind totals, in [`ActionKind`] order.
    pub fn counts(&self) -> BTreeMap<ActionKind, usize> {
        let mut counts = BTreeMap::new();
        for action in &self.actions {
            *counts.entry(action.kind()).or_insert(0) += 1;
        }
        counts
    }
}

impl IntoIterator for ReconciliationPlan {
    type Item = PathAction;
    type IntoIter = std::vec::IntoIter<PathAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

type View = BTreeMap<ContentHash, BTreeSet<RelativePath>>;

#[derive(Debug, Clone)]
struct PendingMove {
    from: RelativePath,
    to: RelativePath,
    hash: ContentHash,
}

#[derive(Debug, Clone)]
struct PendingCopy {
    from: RelativePath,
    to: RelativePath,
    hash: ContentHash,
}

/// Compute the actions turning the `old` tree into the `new` tree.
///
/// Paths matching `excluded` are reported as `SKIPPED` and removed from
/// both sides before any comparison. `new` must have been built with
/// [`ContentIndex::build`] so created content is available.
pub fn plan(old: &ContentIndex, new: &ContentIndex, excluded: &ExclusionSet) -> ReconciliationPlan {
    let skipped: BTreeSet<RelativePath> = old
        .paths()
        .chain(new.paths())
        .filter(|p| excluded.matches(p))
        .cloned()
        .collect();
    let old_view = view_without(old, &skipped);
    let new_view = view_without(new, &skipped);

    let mut no_change: Vec<RelativePath> = Vec::new();
    let mut deletes: BTreeSet<RelativePath> = BTreeSet::new();
    let mut moves: Vec<PendingMove> = Vec::new();
    let mut creates: BTreeMap<RelativePath, ContentHash> = BTreeMap::new();
    let mut copies: Vec<PendingCopy> = Vec::new();

    let hashes: BTreeSet<ContentHash> = old_view.keys().chain(new_view.keys()).copied().collect();
    for hash in hashes {
        match (old_view.get(&hash), new_view.get(&hash)) {
            (Some(old_paths), Some(new_paths)) => {
                let kept: Vec<&RelativePath> = old_paths.intersection(new_paths).collect();
                let sources: Vec<&RelativePath> = old_paths.difference(new_paths).collect();
                let dests: Vec<&RelativePath> = new_paths.difference(old_paths).collect();

                no_change.extend(kept.iter().map(|p| (*p).clone()));

                let paired = sources.len().min(dests.len());
                for (from, to) in sources.iter().zip(dests.iter()) {
                    moves.push(PendingMove {
                        from: (*from).clone(),
                        to: (*to).clone(),
                        hash,
                    });
                }

                // Content is on disk once at least one path holds it.
                if let Some(anchor) = kept.first().or_else(|| dests.first()) {
                    for to in &dests[paired..] {
                        copies.push(PendingCopy {
                            from: (*anchor).clone(),
                            to: (*to).clone(),
                            hash,
                        });
                    }
                }

                deletes.extend(sources[paired..].iter().map(|p| (*p).clone()));
            }
            (None, Some(new_paths)) => {
                let mut paths = new_paths.iter();
                if let Some(first) = paths.next() {
                    creates.insert(first.clone(), hash);
                    for to in paths {
                        copies.push(PendingCopy {
                            from: first.clone(),
                            to: to.clone(),
                            hash,
                        });
                    }
                }
            }
            (Some(old_paths), None) => deletes.extend(old_paths.iter().cloned()),
            (None, None) => {}
        }
    }

    // A path whose old content goes away and that receives new content is
    // rewritten in place rather than deleted first.
    let mut modified: BTreeSet<RelativePath> = BTreeSet::new();
    let mut overwritten: BTreeSet<RelativePath> = BTreeSet::new();
    let move_or_copy_dests: BTreeSet<&RelativePath> = moves
        .iter()
        .map(|m| &m.to)
        .chain(copies.iter().map(|c| &c.to))
        .collect();
    deletes.retain(|path| {
        if creates.contains_key(path) {
            modified.insert(path.clone());
            false
        } else if move_or_copy_dests.contains(path) {
            overwritten.insert(path.clone());
            false
        } else {
            true
        }
    });

    // Everything that exists on disk or is reserved by the plan; temporary
    // names must avoid all of it.
    let mut reserved: BTreeSet<RelativePath> = old.paths().chain(new.paths()).cloned().collect();
    let ordered_moves = order_moves(moves, &mut reserved);

    let existing_dirs: HashSet<RelativePath> = old.paths().flat_map(|p| p.ancestors()).collect();
    let mut emitter = Emitter {
        actions: Vec::new(),
        existing_dirs,
        created_dirs: HashSet::new(),
    };

    for path in &skipped {
        emitter.push(PathAction::Skipped { path: path.clone() });
    }
    no_change.sort();
    for path in no_change {
        emitter.push(PathAction::NoChange { path });
    }

    for path in &deletes {
        emitter.push(PathAction::Deleted { path: path.clone() });
    }

    let mut vacated: Vec<RelativePath> = deletes.iter().cloned().collect();
    for mv in &ordered_moves {
        vacated.push(mv.from.clone());
        let overwrites = overwritten.contains(&mv.to);
        emitter.ensure_parents(&mv.to);
        emitter.push(PathAction::Moved {
            from: mv.from.clone(),
            to: mv.to.clone(),
            hash: mv.hash,
            overwrites,
        });
    }

    for (path, hash) in &creates {
        let Some(content) = new.body(hash).cloned() else {
            tracing::warn!("no content for {path} ({}); index built without bodies", hash.short());
            continue;
        };
        emitter.ensure_parents(path);
        let action = if modified.contains(path) {
            PathAction::Modified {
                path: path.clone(),
                hash: *hash,
                content,
            }
        } else {
            PathAction::Created {
                path: path.clone(),
                hash: *hash,
                content,
            }
        };
        emitter.push(action);
    }

    copies.sort_by(|a, b| a.to.cmp(&b.to));
    for copy in copies {
        let overwrites = overwritten.contains(&copy.to);
        emitter.ensure_parents(&copy.to);
        emitter.push(PathAction::Copy {
            from: copy.from,
            to: copy.to,
            hash: copy.hash,
            overwrites,
        });
    }

    // Directories still holding anything of the final tree are never pruned.
    let final_dirs: HashSet<RelativePath> = new
        .paths()
        .chain(skipped.iter())
        .flat_map(|p| p.ancestors())
        .collect();
    let mut prune: Vec<RelativePath> = vacated
        .iter()
        .filter_map(|p| p.parent())
        .filter(|d| !final_dirs.contains(d))
        // A directory replaced by a file is cleared by the write itself.
        .filter(|d| {
            std::iter::once(d.clone())
                .chain(d.ancestors())
                .all(|a| !new.contains_path(&a) && !skipped.contains(&a))
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    prune.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.cmp(b)));
    for path in prune {
        emitter.push(PathAction::DeletedDir { path });
    }

    let plan = ReconciliationPlan {
        actions: emitter.actions,
    };
    tracing::debug!("planned {} action(s): {:?}", plan.len(), plan.counts());
    plan
}

fn view_without(index: &ContentIndex, skipped: &BTreeSet<RelativePath>) -> View {
    let mut view = View::new();
    for (hash, paths) in index.iter() {
        let remaining: BTreeSet<RelativePath> = paths
            .iter()
            .filter(|p| !skipped.contains(*p))
            .cloned()
            .collect();
        if !remaining.is_empty() {
            view.insert(*hash, remaining);
        }
    }
    view
}

struct Emitter {
    actions: Vec<PathAction>,
    existing_dirs: HashSet<RelativePath>,
    created_dirs: HashSet<RelativePath>,
}

impl Emitter {
    fn push(&mut self, action: PathAction) {
        self.actions.push(action);
    }

    /// Emit `CREATED_DIR` for missing parents of `path`, outermost first.
    fn ensure_parents(&mut self, path: &RelativePath) {
        for dir in path.ancestors().into_iter().rev() {
            if self.existing_dirs.contains(&dir) || self.created_dirs.contains(&dir) {
                continue;
            }
            self.created_dirs.insert(dir.clone());
            self.actions.push(PathAction::CreatedDir { path: dir });
        }
    }
}

// ---------------------------------------------------------------------------
// Move ordering
// ---------------------------------------------------------------------------

/// A move onto `to` must wait while `from` of a pending move is `to`
/// itself, lies under it, or is one of its parents.
fn blocks(to: &RelativePath, pending_from: &RelativePath) -> bool {
    to.is_within(pending_from) || pending_from.is_within(to)
}

/// Order moves so that none lands on a path still to be vacated.
///
/// Cycles are broken by first renaming one blocking source to a fresh
/// temporary name; its real move then proceeds from there.
fn order_moves(mut pending: Vec<PendingMove>, reserved: &mut BTreeSet<RelativePath>) -> Vec<PendingMove> {
    pending.sort_by(|a, b| a.to.cmp(&b.to).then_with(|| a.from.cmp(&b.from)));
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready = (0..pending.len()).find(|&i| !is_blocked(i, &pending));

        if let Some(i) = ready {
            ordered.push(pending.remove(i));
            continue;
        }

        // Deadlock: find a source that blocks some pending move and park it.
        let Some(victim) = (0..pending.len()).find(|&j| {
            (0..pending.len()).any(|i| blocked_by(i, j, &pending))
        }) else {
            // Unreachable for well-formed input; keep the remaining order.
            ordered.append(&mut pending);
            break;
        };

        let tmp = temp_name(&pending[victim].from, reserved);
        tracing::debug!("breaking move cycle via {tmp}");
        ordered.push(PendingMove {
            from: pending[victim].from.clone(),
            to: tmp.clone(),
            hash: pending[victim].hash,
        });
        pending[victim].from = tmp;
    }
    ordered
}

/// Move `i` cannot run before move `j` has vacated its source.
fn blocked_by(i: usize, j: usize, pending: &[PendingMove]) -> bool {
    if i == j {
        nests(&pending[i])
    } else {
        blocks(&pending[i].to, &pending[j].from)
    }
}

fn is_blocked(i: usize, pending: &[PendingMove]) -> bool {
    (0..pending.len()).any(|j| blocked_by(i, j, pending))
}

/// Source and destination contain one another (`a` -> `a/inner`).
fn nests(mv: &PendingMove) -> bool {
    mv.to.is_within(&mv.from) || mv.from.is_within(&mv.to)
}

fn temp_name(from: &RelativePath, reserved: &mut BTreeSet<RelativePath>) -> RelativePath {
    let mut n = 0usize;
    loop {
        let suffix = if n == 0 {
            MOVE_TMP_SUFFIX.to_string()
        } else {
            format!("{MOVE_TMP_SUFFIX}-{n}")
        };
        let candidate = from.with_suffix(&suffix);
        let clash = reserved
            .iter()
            .any(|p| p.is_within(&candidate) || candidate.is_within(p));
        if !clash {
            reserved.insert(candidate.clone());
            return candidate;
        }
        n += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
