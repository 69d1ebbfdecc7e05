//! Exclusion policy: paths the planner must leave alone.
//!
//! An [`ExclusionSet`] is a union of predicates over relative paths. Globs
//! are matched with `/` as a literal separator, so `*` never crosses a
//! directory boundary while `**` does.

use std::fmt;

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use dslc_core::RelativePath;

use crate::error::SyncError;

type Predicate = Box<dyn Fn(&RelativePath) -> bool + Send + Sync>;

/// Caller-supplied exclusion predicates, checked before hash bucketing.
pub struct ExclusionSet {
    globs: Vec<Glob>,
    compiled: GlobSet,
    suffixes: Vec<String>,
    predicates: Vec<Predicate>,
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self {
            globs: Vec::new(),
            compiled: GlobSet::empty(),
            suffixes: Vec::new(),
            predicates: Vec::new(),
        }
    }
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusion set built from glob patterns.
    pub fn from_globs<I, S>(patterns: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for pattern in patterns {
            set = set.with_glob(pattern.as_ref())?;
        }
        Ok(set)
    }

    /// Add a glob pattern.
    pub fn with_glob(mut self, pattern: &str) -> Result<Self, SyncError> {
        let glob = GlobBuilder::new(pattern).literal_separator(true).build()?;
        self.globs.push(glob);
        let mut builder = GlobSetBuilder::new();
        for glob in &self.globs {
            builder.add(glob.clone());
        }
        self.compiled = builder.build()?;
        Ok(self)
    }

    /// Add a "path ends with" rule, e.g. a well-known manifest file name.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffixes.push(suffix.into());
        self
    }

    /// Add an arbitrary predicate.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RelativePath) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Box::new(predicate));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty() && self.suffixes.is_empty() && self.predicates.is_empty()
    }

    pub fn matches(&self, path: &RelativePath) -> bool {
        (!self.globs.is_empty() && self.compiled.is_match(path.as_str()))
            || self.suffixes.iter().any(|s| path.as_str().ends_with(s.as_str()))
            || self.predicates.iter().any(|p| p(path))
    }
}

impl fmt::Debug for ExclusionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusionSet")
            .field(
                "globs",
                &self.globs.iter().map(|g| g.glob()).collect::<Vec<_>>(),
            )
            .field("suffixes", &self.suffixes)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
