//! Environment source: `BRANCHLOG__STORE__BACKEND=file` sets `store.backend`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const PREFIX: &str = "BRANCHLOG";
pub const SEPARATOR: &str = "__";

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(Environment::with_prefix(PREFIX).separator(SEPARATOR))
}
