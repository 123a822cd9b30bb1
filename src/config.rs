//! Configuration System
//!
//! Layered configuration: built-in defaults, then the global config file, then
//! the workspace's `config/` files, then `BRANCHLOG__*` environment variables.

use crate::backend::BackendKind;
use crate::error::StoreError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

mod merge;
mod sources;

pub use sources::global_file::global_config_path;

/// Directory under the workspace holding configuration files.
pub const CONFIG_DIR: &str = "config";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchlogConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the store lives and how it is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store directory, relative paths resolve against the workspace
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Branch to open on, as a path from the root or a branch id. When unset
    /// the branch recorded in the store is used.
    #[serde(default)]
    pub branch: Option<String>,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".branchlog/store")
}

fn default_backend() -> BackendKind {
    BackendKind::Sled
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            backend: default_backend(),
            branch: None,
        }
    }
}

impl StoreConfig {
    /// Store directory resolved against `workspace_root`.
    pub fn resolved_path(&self, workspace_root: &Path) -> PathBuf {
        if self.path.is_relative() {
            workspace_root.join(&self.path)
        } else {
            self.path.clone()
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Store(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Store(msg) => write!(f, "Store: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

impl BranchlogConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.store.path.as_os_str().is_empty() {
            errors.push(ValidationError::Store("path cannot be empty".to_string()));
        }
        if let Some(branch) = &self.store.branch {
            if branch.trim().is_empty() {
                errors.push(ValidationError::Store(
                    "branch cannot be blank when set".to_string(),
                ));
            }
        }

        let logging = &self.logging;
        if !LOG_LEVELS.contains(&logging.level.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "unknown level '{}'",
                logging.level
            )));
        }
        if logging.format != "json" && logging.format != "text" {
            errors.push(ValidationError::Logging(format!(
                "unknown format '{}'",
                logging.format
            )));
        }
        if logging
            .output
            .parse::<crate::logging::LogOutput>()
            .is_err()
        {
            errors.push(ValidationError::Logging(format!(
                "unknown output '{}'",
                logging.output
            )));
        }
        for (module, level) in &logging.modules {
            if !LOG_LEVELS.contains(&level.as_str()) {
                errors.push(ValidationError::Logging(format!(
                    "unknown level '{}' for module '{}'",
                    level, module
                )));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold the errors into one [`StoreError::ConfigError`].
    pub fn ensure_valid(&self) -> Result<(), StoreError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            StoreError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })
    }
}

/// Builds a [`BranchlogConfig`] from the configured sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace from every layer.
    pub fn load(workspace_root: &Path) -> Result<BranchlogConfig, StoreError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = sources::environment::add_to_builder(builder);

        let config: BranchlogConfig = builder.build()?.try_deserialize()?;
        debug!(
            workspace = %workspace_root.display(),
            backend = %config.store.backend,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load configuration from one explicit file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<BranchlogConfig, StoreError> {
        if !path.exists() {
            return Err(StoreError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = merge::merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Write `config` as the workspace's base config file.
    pub fn write_workspace_config(
        workspace_root: &Path,
        config: &BranchlogConfig,
    ) -> Result<PathBuf, StoreError> {
        let dir = workspace_root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| {
            StoreError::ConfigError(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        let path = dir.join(sources::workspace_file::BASE_FILE);
        let text = toml::to_string_pretty(config)
            .map_err(|e| StoreError::ConfigError(format!("Failed to encode config: {}", e)))?;
        std::fs::write(&path, text).map_err(|e| {
            StoreError::ConfigError(format!("Failed to write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }
}
