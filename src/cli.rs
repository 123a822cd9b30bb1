//! CLI domain: parse, route, help, output, and presentation only.
//! Store operations live in the library; the route table opens the store and
//! hands each command to a session.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands, OutputFormat};
pub use presentation::{format_clone_summary, format_init_summary, format_outcome};
pub use route::RunContext;
