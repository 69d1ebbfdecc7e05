//! dslc core library — domain types, project configuration, errors.
//!
//! Public API surface:
//! - [`types`] — [`RelativePath`] and [`FileEntry`]
//! - [`error`] — [`PathError`], [`ConfigError`]
//! - [`config`] — `dslc.yaml` load / save / init
//! - [`targets`] — the static table of generation targets

pub mod config;
pub mod error;
pub mod targets;
pub mod types;

pub use config::{ManifestRule, ProjectConfig};
pub use error::{ConfigError, PathError};
pub use targets::{BuildTool, Target};
pub use types::{FileEntry, RelativePath};
