//! CLI command-name contract for logging and routing.

use crate::cli::parse::Commands;
use crate::session::ShellCommand;

/// Command name string for log events (e.g. "init", "session.merge").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Init { .. } => "init".to_string(),
        Commands::Clone { .. } => "clone".to_string(),
        Commands::Shell { .. } => "shell".to_string(),
        Commands::Session(command) => format!("session.{}", session_command_name(command)),
    }
}

pub fn session_command_name(command: &ShellCommand) -> &'static str {
    match command {
        ShellCommand::Name { .. } => "name",
        ShellCommand::Branch { list: true, .. } | ShellCommand::List => "list",
        ShellCommand::Branch { .. } => "branch",
        ShellCommand::Checkout { .. } => "checkout",
        ShellCommand::Merge { .. } => "merge",
        ShellCommand::Complete => "complete",
        ShellCommand::Recall { .. } => "recall",
        ShellCommand::Status => "status",
        ShellCommand::Stream => "stream",
        ShellCommand::Show { .. } => "show",
        ShellCommand::Push => "push",
        ShellCommand::Fetch => "fetch",
    }
}
