//! Error types for dslc-sync.

use std::path::PathBuf;

use thiserror::Error;

use dslc_core::{PathError, RelativePath};

use crate::index::ContentHash;

/// All errors that can arise from indexing, planning inputs and applying.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Two entries claim the same path with different content.
    #[error("duplicate path {path} with different content")]
    DuplicatePath { path: RelativePath },

    /// One generated path is both a file and the parent of another.
    #[error("{nested} requires {file} to be a directory, but {file} is also a file")]
    PathConflict {
        file: RelativePath,
        nested: RelativePath,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A path that would resolve outside the output root.
    #[error("path '{path}' resolves outside the output root")]
    OutOfRoot { path: String },

    /// A generated file name that is not a usable relative path.
    #[error("invalid path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: PathError,
    },

    /// Content on disk after a write does not hash to what was planned.
    #[error("content at {path} hashes to {actual}, expected {expected}")]
    Verification {
        path: PathBuf,
        expected: ContentHash,
        actual: ContentHash,
    },

    /// An exclusion glob that does not compile.
    #[error("invalid exclusion pattern: {0}")]
    Pattern(#[from] globset::Error),
}

impl SyncError {
    /// Map a path-cleaning failure for `raw` onto the engine taxonomy.
    pub(crate) fn from_path_error(raw: &str, err: PathError) -> Self {
        match err {
            PathError::EscapesRoot { .. } => SyncError::OutOfRoot {
                path: raw.to_string(),
            },
            other => SyncError::InvalidPath {
                path: raw.to_string(),
                source: other,
            },
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
