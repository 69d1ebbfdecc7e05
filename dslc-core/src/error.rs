//! Error types for dslc-core.

use std::path::PathBuf;

use thiserror::Error;

/// A generated file name that cannot be used as a path under the output root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Nothing left after cleaning (e.g. `""` or `"//"`).
    #[error("empty relative path")]
    Empty,

    /// A `..` segment would leave the output root.
    #[error("path '{path}' escapes the output root")]
    EscapesRoot { path: String },

    /// A segment that is not portable as a single file name.
    #[error("path '{path}' has invalid segment '{segment}'")]
    InvalidSegment { path: String, segment: String },

    /// A file name on disk that cannot be represented as UTF-8.
    #[error("path '{path}' is not valid UTF-8")]
    NotUtf8 { path: String },
}

/// All errors that can arise from project configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path and serde_yaml's line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No `dslc.yaml` at the expected location.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// `init` refuses to overwrite an existing config.
    #[error("config already exists at {path}")]
    AlreadyExists { path: PathBuf },

    /// A `targets:` entry that is not in the target table.
    #[error("unknown target '{name}'; run `dslc targets` for the list")]
    UnknownTarget { name: String },
}
