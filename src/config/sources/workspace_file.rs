//! Workspace config file source: config/config.toml and config/{env}.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

/// Base workspace config file name.
pub const BASE_FILE: &str = "config.toml";

/// Selects the environment-specific file, e.g. `BRANCHLOG_ENV=test` reads
/// `config/test.toml`.
pub const ENV_NAME: &str = "BRANCHLOG_ENV";

/// Add workspace config files to builder.
/// Precedence: config/config.toml (base) then config/{BRANCHLOG_ENV}.toml.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let config_dir = workspace_root.join(crate::config::CONFIG_DIR);
    let env_name = std::env::var(ENV_NAME).unwrap_or_else(|_| "development".to_string());

    let mut builder = builder;

    let base_config_path = config_dir.join(BASE_FILE);
    if base_config_path.exists() {
        builder = builder.add_source(File::from(base_config_path).required(false));
    }

    let env_config_path = config_dir.join(format!("{}.toml", env_name));
    if env_config_path.exists() {
        builder = builder.add_source(File::from(env_config_path).required(false));
    }

    Ok(builder)
}
