//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources replace individual keys of earlier ones; tables are merged
//! key by key rather than replaced wholesale.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("store.path", ".branchlog/store")?
        .set_default("store.backend", "sled")?
        .set_default("logging.level", "warn")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
