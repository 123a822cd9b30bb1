//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::StoreError;

/// Map store errors to a string for CLI output.
pub fn map_error(e: &StoreError) -> String {
    match e {
        // Already rendered for the user (clap usage, hints).
        StoreError::InvalidCommand(msg) => msg.trim_end().to_string(),
        e if e.is_integrity_failure() => format!("{} (the store data is inconsistent)", e),
        e => e.to_string(),
    }
}
