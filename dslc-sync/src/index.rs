//! Content index — a content-addressed view of a file tree.
//!
//! Maps SHA-256 digests of raw file bytes to the ordered set of relative
//! paths holding that content. Bytes are hashed as-is: no line-ending or
//! encoding normalization, so binary outputs are safe to pass through.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use dslc_core::{FileEntry, RelativePath};

use crate::error::SyncError;

// ---------------------------------------------------------------------------
// ContentHash
// ---------------------------------------------------------------------------

/// SHA-256 digest of a file's bytes. Equal hashes mean equal content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        let mut h = Sha256::new();
        h.update(bytes);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&h.finalize());
        Self(digest)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// ContentIndex
// ---------------------------------------------------------------------------

/// Hash → ordered paths, plus the reverse lookup.
///
/// Every path appears under exactly one hash. Built fresh for each
/// reconciliation and never persisted.
#[derive(Debug, Clone, Default)]
pub struct ContentIndex {
    buckets: BTreeMap<ContentHash, BTreeSet<RelativePath>>,
    by_path: BTreeMap<RelativePath, ContentHash>,
    bodies: BTreeMap<ContentHash, Arc<[u8]>>,
}

impl ContentIndex {
    /// Index in-memory entries, keeping one body per distinct hash.
    ///
    /// Entry order does not matter. Two entries for the same path are
    /// collapsed when their bytes match and rejected with
    /// [`SyncError::DuplicatePath`] otherwise.
    pub fn build(entries: impl IntoIterator<Item = FileEntry>) -> Result<Self, SyncError> {
        let entries: Vec<FileEntry> = entries.into_iter().collect();
        let hashed: Vec<(FileEntry, ContentHash)> = entries
            .into_par_iter()
            .map(|entry| {
                let hash = ContentHash::of(&entry.content);
                (entry, hash)
            })
            .collect();

        let mut index = Self::default();
        for (entry, hash) in hashed {
            index.insert(entry.path, hash)?;
            index
                .bodies
                .entry(hash)
                .or_insert_with(|| Arc::from(entry.content));
        }
        if let Some((file, nested)) = index.file_dir_clash() {
            return Err(SyncError::PathConflict { file, nested });
        }
        tracing::debug!(
            "indexed {} path(s) across {} distinct content hash(es)",
            index.len(),
            index.buckets.len()
        );
        Ok(index)
    }

    /// Index precomputed `(path, hash)` pairs without bodies.
    ///
    /// Used for the existing output tree, whose bytes are never rewritten
    /// from memory.
    pub fn from_hashes(
        pairs: impl IntoIterator<Item = (RelativePath, ContentHash)>,
    ) -> Result<Self, SyncError> {
        let mut index = Self::default();
        for (path, hash) in pairs {
            index.insert(path, hash)?;
        }
        Ok(index)
    }

    fn insert(&mut self, path: RelativePath, hash: ContentHash) -> Result<(), SyncError> {
        if let Some(existing) = self.by_path.get(&path) {
            if *existing == hash {
                return Ok(());
            }
            return Err(SyncError::DuplicatePath { path });
        }
        self.buckets.entry(hash).or_default().insert(path.clone());
        self.by_path.insert(path, hash);
        Ok(())
    }

    /// First path that is also a parent directory of another path.
    fn file_dir_clash(&self) -> Option<(RelativePath, RelativePath)> {
        self.by_path.keys().find_map(|path| {
            path.ancestors()
                .into_iter()
                .find(|dir| self.by_path.contains_key(dir))
                .map(|dir| (dir, path.clone()))
        })
    }

    /// Number of indexed paths.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Buckets in ascending hash order.
    pub fn iter(&self) -> impl Iterator<Item = (&ContentHash, &BTreeSet<RelativePath>)> {
        self.buckets.iter()
    }

    /// Paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &RelativePath> {
        self.by_path.keys()
    }

    pub fn paths_for(&self, hash: &ContentHash) -> Option<&BTreeSet<RelativePath>> {
        self.buckets.get(hash)
    }

    pub fn hash_of(&self, path: &RelativePath) -> Option<ContentHash> {
        self.by_path.get(path).copied()
    }

    pub fn contains_path(&self, path: &RelativePath) -> bool {
        self.by_path.contains_key(path)
    }

    /// Bytes for `hash`, when the index was built with [`ContentIndex::build`].
    pub fn body(&self, hash: &ContentHash) -> Option<&Arc<[u8]>> {
        self.bodies.get(hash)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
