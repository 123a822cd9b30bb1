//! CLI presentation: text and json formatters for session outcomes.

use crate::backend::BackendKind;
use crate::cli::parse::OutputFormat;
use crate::error::{StorageError, StoreError};
use crate::session::{BranchRow, Outcome, RecordLine, StatusReport};
use crate::types::StoreId;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use std::path::Path;

pub fn format_outcome(outcome: &Outcome, format: OutputFormat) -> Result<String, StoreError> {
    match format {
        OutputFormat::Json => to_json(outcome),
        OutputFormat::Text => Ok(format_outcome_text(outcome)),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::Storage(StorageError::Serialization(e.to_string())))
}

fn format_outcome_text(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Appended {
            branch,
            sequence,
            summary,
        } => format!("{}[{}] = {}", branch, sequence, summary),
        Outcome::BranchCreated {
            path,
            command_count,
        } => format!("Created {} (inherits {} commands)", path, command_count),
        Outcome::Branches {
            rows,
            local_branches,
            local_commands,
            remote_branches,
            remote_commands,
        } => {
            let mut lines: Vec<String> = rows.iter().map(format_branch_row).collect();
            lines.push(String::new());
            lines.push(format!(
                "{} {} in {} local {}",
                local_commands,
                plural(*local_commands as usize, "command", "commands"),
                local_branches,
                plural(*local_branches, "branch", "branches")
            ));
            if *remote_commands > 0 {
                lines.push(format!(
                    "{} {} in {} remote {}",
                    remote_commands,
                    plural(*remote_commands as usize, "command", "commands"),
                    remote_branches,
                    plural(*remote_branches, "branch", "branches")
                ));
            }
            lines.join("\n")
        }
        Outcome::CheckedOut { path } => format!("Switched to {}", path),
        Outcome::Merged { from, into, range } => format!(
            "Merged [{},{}] from {} into {}",
            range.min, range.max, from, into
        ),
        Outcome::Completed { path } => format!("Completed {}", path),
        Outcome::Records { lines } => lines
            .iter()
            .map(format_record_line)
            .collect::<Vec<_>>()
            .join("\n"),
        Outcome::Stream { lines } => format_stream_table(lines),
        Outcome::Shown {
            reference,
            branch,
            sequence,
            summary,
        } => format!("{} -> {}[{}] = {}", reference, branch, sequence, summary),
        Outcome::Status { report } => format_status(report),
        Outcome::Pushed { commands, branches } => format!(
            "Pushed {} {} in {} {}",
            commands,
            plural(*commands as usize, "command", "commands"),
            branches,
            plural(*branches, "branch", "branches")
        ),
        Outcome::Fetched { commands, branches } => format!(
            "Fetched {} {} in {} {}",
            commands,
            plural(*commands as usize, "command", "commands"),
            branches,
            plural(*branches, "branch", "branches")
        ),
    }
}

/// `* ^B/C (behind parent by 1, ahead of parent by 2 - pushed to [4])`
///
/// `*` marks the current branch. `^` marks a remote branch that can be
/// branched from, `.` one that cannot (work pushed in from a clone).
fn format_branch_row(row: &BranchRow) -> String {
    let prefix = if row.current { "*" } else { " " };
    let marker = match (row.remote, row.can_branch) {
        (false, _) => " ",
        (true, true) => "^",
        (true, false) => ".",
    };
    let name = if row.path.is_empty() {
        &row.label
    } else {
        &row.path
    };

    let mut notes = Vec::new();
    if row.behind > 0 {
        notes.push(format!("behind parent by {}", row.behind));
    }
    if row.ahead > 0 {
        let mut ahead = format!("ahead of parent by {}", row.ahead);
        if row.last_push != 0 {
            ahead.push_str(&format!(" - pushed to [{}]", row.last_push));
        }
        notes.push(ahead);
    }
    if row.completed {
        notes.push("completed".to_string());
    }

    if notes.is_empty() {
        format!("{} {}{}", prefix, marker, name)
    } else {
        format!("{} {}{} ({})", prefix, marker, name, notes.join(", "))
    }
}

fn format_record_line(line: &RecordLine) -> String {
    match &line.branch {
        Some(branch) => format!("{}[{}] = {}", branch, line.sequence, line.summary),
        None => format!("[{}] = {}", line.sequence, line.summary),
    }
}

fn format_stream_table(lines: &[RecordLine]) -> String {
    if lines.is_empty() {
        return "Stream is empty.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Branch", "Seq", "Command"]);
    for (i, line) in lines.iter().enumerate() {
        let branch = match line.branch.as_deref() {
            Some("") | None => "/",
            Some(branch) => branch,
        };
        table.add_row(vec![
            (i + 1).to_string(),
            branch.to_string(),
            line.sequence.to_string(),
            line.summary.clone(),
        ]);
    }
    table.to_string()
}

fn format_status(report: &StatusReport) -> String {
    let mut lines = vec![
        format!("Store:    {}", report.store),
        format!("Branch:   {}", report.branch),
        format!("Position: {}", report.position),
        format!("Commands: {}", report.command_count),
        format!("Behind:   {}", report.behind),
        format!("Ahead:    {}", report.ahead),
    ];
    if report.remote {
        lines.push("Remote:   yes (new commands go to a local child)".to_string());
    }
    if report.completed {
        lines.push("Completed: yes".to_string());
    }
    if let Some(upstream) = &report.upstream {
        lines.push(format!("Upstream: {}", upstream));
    }
    lines.join("\n")
}

pub fn format_init_summary(
    name: &str,
    store_id: StoreId,
    path: &Path,
    backend: BackendKind,
    format: OutputFormat,
) -> Result<String, StoreError> {
    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "result": "initialized",
            "name": name,
            "store_id": store_id,
            "path": path.display().to_string(),
            "backend": backend,
        })),
        OutputFormat::Text => Ok(format!(
            "Created store {} ({}) at {} using the {} backend",
            name,
            store_id,
            path.display(),
            backend
        )),
    }
}

pub fn format_clone_summary(
    name: &str,
    upstream: &str,
    branches: usize,
    format: OutputFormat,
) -> Result<String, StoreError> {
    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "result": "cloned",
            "name": name,
            "upstream": upstream,
            "branches": branches,
        })),
        OutputFormat::Text => Ok(format!(
            "Cloned {} into {} ({} {})",
            upstream,
            name,
            branches,
            plural(branches, "branch", "branches")
        )),
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 {
        one
    } else {
        many
    }
}
