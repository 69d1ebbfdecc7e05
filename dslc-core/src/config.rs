//! Per-project `dslc.yaml` configuration.
//!
//! # Storage layout
//!
//! ```text
//! <project>/
//!   dslc.yaml        (this config)
//!   .dslc/staging/   (generated files dropped by the compiler, default)
//!   generated/       (reconciled output root, default)
//! ```
//!
//! # API pattern
//!
//! Every function takes the project directory explicitly (`fn_at(dir, …)`);
//! tests always pass a `TempDir`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::targets::Target;

/// File name of the project config.
pub const CONFIG_FILE: &str = "dslc.yaml";

const DEFAULT_OUTPUT: &str = "generated";
const DEFAULT_STAGING: &str = ".dslc/staging";
const DEFAULT_DIR_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A generated file that bypasses reconciliation and is always written to
/// its own destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRule {
    /// Glob over relative paths of the generated set.
    pub pattern: String,
    /// Where the file is written, relative to the project directory.
    pub destination: PathBuf,
}

/// Contents of `dslc.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default = "default_staging")]
    pub staging: PathBuf,

    #[serde(default)]
    pub targets: Vec<String>,

    /// Extra glob exclusions; matching paths are left untouched.
    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub manifests: Vec<ManifestRule>,

    #[serde(default = "default_dir_retries")]
    pub dir_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Command (argv) run in the output directory after a successful sync.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_sync: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            staging: default_staging(),
            targets: Vec::new(),
            exclude: Vec::new(),
            manifests: Vec::new(),
            dir_retries: DEFAULT_DIR_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            post_sync: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Config for the given targets, with their manifest rules filled in.
    pub fn for_targets(names: &[String]) -> Result<Self, ConfigError> {
        let mut config = Self {
            targets: names.to_vec(),
            ..Self::default()
        };
        config.validate()?;

        for name in names {
            let Some(pattern) = Target::find(name).and_then(|t| t.manifest) else {
                continue;
            };
            if config.manifests.iter().any(|m| m.pattern == pattern) {
                continue;
            }
            config.manifests.push(ManifestRule {
                pattern: pattern.to_string(),
                destination: PathBuf::from("project.ini"),
            });
        }
        Ok(config)
    }

    /// Reject target names missing from the target table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in &self.targets {
            if Target::find(name).is_none() {
                return Err(ConfigError::UnknownTarget { name: name.clone() });
            }
        }
        Ok(())
    }

    /// Output root, resolved against the project directory.
    pub fn output_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.output)
    }

    /// Staging directory, resolved against the project directory.
    pub fn staging_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.staging)
    }
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

fn default_staging() -> PathBuf {
    PathBuf::from(DEFAULT_STAGING)
}

fn default_dir_retries() -> u32 {
    DEFAULT_DIR_RETRIES
}

fn default_retry_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

// ---------------------------------------------------------------------------
// Load / save / init
// ---------------------------------------------------------------------------

/// `<dir>/dslc.yaml` — pure, no I/O.
pub fn config_path_at(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Load `<dir>/dslc.yaml`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with
/// path + line context) if malformed, `ConfigError::UnknownTarget` if a
/// target name is not in the table.
pub fn load_at(dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = config_path_at(dir);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    let config: ProjectConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// Atomically save `<dir>/dslc.yaml`.
///
/// Write flow: serialize → `dslc.yaml.tmp` sibling → `rename`.
pub fn save_at(dir: &Path, config: &ProjectConfig) -> Result<(), ConfigError> {
    std::fs::create_dir_all(dir)?;
    let path = config_path_at(dir);
    let tmp_path = path.with_file_name(format!("{CONFIG_FILE}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Create `<dir>/dslc.yaml` for `targets`.
///
/// Refuses to overwrite an existing config.
pub fn init_at(dir: &Path, targets: &[String]) -> Result<ProjectConfig, ConfigError> {
    let path = config_path_at(dir);
    if path.exists() {
        return Err(ConfigError::AlreadyExists { path });
    }
    let config = ProjectConfig::for_targets(targets)?;
    save_at(dir, &config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
