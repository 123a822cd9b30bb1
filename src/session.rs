//! Interactive session commands
//!
//! Parses one command line (`name`, `branch`, `checkout`, `merge`, ...) and
//! applies it to a store. Results come back as an [`Outcome`] so the caller
//! decides how to present them.

use crate::command::{CommandRecord, Payload};
use crate::error::StoreError;
use crate::reference::CommandRef;
use crate::store::Store;
use crate::sync::{self, SyncSummary};
use crate::types::{BranchId, IdRange, Sequence};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

/// Number of records shown by `recall` when no count is given.
pub const DEFAULT_RECALL_COUNT: u32 = 20;

#[derive(Parser, Debug)]
#[command(name = "branchlog", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

/// Commands accepted by a session, either typed at the shell or given directly
/// on the command line.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Label the current point in history (defaults to its position, e.g. B[3])
    Name {
        label: Vec<String>,
    },

    /// Create a child of the current branch, or list branches
    #[command(visible_aliases = ["mkdir", "md"])]
    Branch {
        /// Name of the new branch
        name: Option<String>,

        /// Number of commands to inherit (omit to branch from the end)
        count: Option<u32>,

        #[arg(short, long)]
        list: bool,
    },

    /// List branches
    #[command(visible_aliases = ["ls", "dir"])]
    List,

    /// Switch to another branch (`..`, `/`, `/a/b`, `a/b`, `../c`)
    #[command(visible_aliases = ["cd", "cb"])]
    Checkout {
        path: String,

        /// Create the branch first, then check it out
        #[arg(short = 'b', long)]
        branch: bool,
    },

    /// Merge from the parent (`..`) or from a child into the current branch
    #[command(visible_alias = "m")]
    Merge { from: String },

    /// Mark the current branch completed
    Complete,

    /// Show recent commands, most recent first
    Recall {
        count: Option<u32>,

        /// Recall from the reconstructed stream rather than the branch log
        #[arg(short, long)]
        all: bool,
    },

    /// Show the current branch and its position relative to its parent
    Status,

    /// Show every command visible from the current branch
    Stream,

    /// Show the command a reference points at (`[3]`, `{..}[2]`, `{<id>}[1.2]`)
    Show { reference: String },

    /// Send local work to the upstream store
    Push,

    /// Bring in new work from the upstream store
    Fetch,
}

/// One branch in a branch listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchRow {
    pub id: BranchId,
    pub label: String,
    pub path: String,
    pub current: bool,
    pub remote: bool,
    pub can_branch: bool,
    pub command_count: u32,
    pub behind: u32,
    pub ahead: u32,
    pub last_push: u32,
    pub completed: bool,
}

/// One record shown by `recall` or `stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordLine {
    /// Branch path, given when lines come from several branches.
    pub branch: Option<String>,
    pub sequence: Sequence,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub store: String,
    pub branch: String,
    pub position: String,
    pub command_count: u32,
    pub behind: u32,
    pub ahead: u32,
    pub remote: bool,
    pub completed: bool,
    pub upstream: Option<String>,
}

/// Result of executing one session command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Appended {
        branch: String,
        sequence: Sequence,
        summary: String,
    },
    BranchCreated {
        path: String,
        command_count: u32,
    },
    Branches {
        rows: Vec<BranchRow>,
        local_branches: usize,
        local_commands: u32,
        remote_branches: usize,
        remote_commands: u32,
    },
    CheckedOut {
        path: String,
    },
    Merged {
        from: String,
        into: String,
        range: IdRange,
    },
    Completed {
        path: String,
    },
    Records {
        lines: Vec<RecordLine>,
    },
    Stream {
        lines: Vec<RecordLine>,
    },
    Shown {
        reference: String,
        branch: String,
        sequence: Sequence,
        summary: String,
    },
    Status {
        report: StatusReport,
    },
    Pushed {
        commands: u32,
        branches: usize,
    },
    Fetched {
        commands: u32,
        branches: usize,
    },
}

/// Opens the upstream store recorded in a clone's metadata.
pub type UpstreamOpener = Box<dyn Fn(&str) -> Result<Store, StoreError>>;

/// A store plus the means to reach its upstream.
pub struct Session {
    store: Store,
    upstream: Option<UpstreamOpener>,
}

impl Session {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            upstream: None,
        }
    }

    pub fn with_upstream(mut self, opener: UpstreamOpener) -> Self {
        self.upstream = Some(opener);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    /// Prompt shown by the interactive shell.
    pub fn prompt(&self) -> String {
        let id = self.store.current_id();
        format!("{}> ", self.store.context_label(&id))
    }

    /// Parse and execute one command line.
    pub fn execute(&mut self, line: &str) -> Result<Outcome, StoreError> {
        let parsed = ShellLine::try_parse_from(line.split_whitespace())
            .map_err(|e| StoreError::InvalidCommand(e.render().to_string()))?;
        debug!(line = %line.trim(), "Executing session command");
        self.run(&parsed.command)
    }

    pub fn run(&mut self, command: &ShellCommand) -> Result<Outcome, StoreError> {
        match command {
            ShellCommand::Name { label } => self.name(label),
            ShellCommand::Branch { list: true, .. } | ShellCommand::List => self.list(),
            ShellCommand::Branch {
                name: Some(name),
                count,
                ..
            } => self.branch(name, *count),
            ShellCommand::Branch { name: None, .. } => Err(StoreError::InvalidCommand(
                "You need to specify a name for the new branch".to_string(),
            )),
            ShellCommand::Checkout { path, branch } => {
                if *branch {
                    self.branch(path, None)?;
                }
                let id = self.store.checkout(path)?;
                Ok(Outcome::CheckedOut {
                    path: self.store.branch_label(&id),
                })
            }
            ShellCommand::Merge { from } => {
                let range = self.store.merge(from)?;
                let into = self.store.current_id();
                Ok(Outcome::Merged {
                    from: self.store.branch_label(&range.branch_id),
                    into: self.store.branch_label(&into),
                    range,
                })
            }
            ShellCommand::Complete => {
                self.store.complete()?;
                let id = self.store.current_id();
                Ok(Outcome::Completed {
                    path: self.store.branch_label(&id),
                })
            }
            ShellCommand::Recall { count, all } => {
                self.recall(count.unwrap_or(DEFAULT_RECALL_COUNT), *all)
            }
            ShellCommand::Status => self.status(),
            ShellCommand::Stream => self.stream(),
            ShellCommand::Show { reference } => self.show(reference),
            ShellCommand::Push => {
                let summary = self.sync_with_upstream(true)?;
                Ok(Outcome::Pushed {
                    commands: summary.commands,
                    branches: summary.branches,
                })
            }
            ShellCommand::Fetch => {
                let summary = self.sync_with_upstream(false)?;
                Ok(Outcome::Fetched {
                    commands: summary.commands,
                    branches: summary.branches,
                })
            }
        }
    }

    fn name(&mut self, label: &[String]) -> Result<Outcome, StoreError> {
        let name = if label.is_empty() {
            // A remote branch is extended through its local child, so the
            // label has to reflect where the command will actually land.
            if self.store.is_remote(self.store.current()) {
                self.store.create_local()?;
            }
            let id = self.store.current_id();
            self.store.context_label(&id)
        } else {
            label.join(" ")
        };
        let record = self.store.append(Payload::Name { name })?;
        let id = self.store.current_id();
        Ok(Outcome::Appended {
            branch: self.store.branch_label(&id),
            sequence: record.sequence,
            summary: summarize(&self.store, &id, &record),
        })
    }

    fn branch(&mut self, name: &str, count: Option<u32>) -> Result<Outcome, StoreError> {
        let id = self.store.create_branch(name, count)?;
        Ok(Outcome::BranchCreated {
            path: self.store.branch_path(&id),
            command_count: self.store.require(&id)?.refresh_count,
        })
    }

    fn list(&self) -> Result<Outcome, StoreError> {
        let store = &self.store;
        let mut rows = Vec::new();
        let (mut local_branches, mut local_commands) = (0, 0);
        let (mut remote_branches, mut remote_commands) = (0, 0);

        for branch in store.branches() {
            let remote = store.is_remote(branch);
            if remote {
                remote_branches += 1;
                remote_commands += branch.command_count;
            } else {
                local_branches += 1;
                local_commands += branch.command_count;
            }
            rows.push(BranchRow {
                id: branch.id,
                label: store.branch_label(&branch.id),
                path: store.branch_path(&branch.id),
                current: branch.id == store.current_id(),
                remote,
                can_branch: store.can_branch(branch),
                command_count: branch.command_count,
                behind: store.behind_count(&branch.id)?,
                ahead: store.ahead_count(&branch.id)?,
                last_push: branch.last_push,
                completed: branch.is_completed,
            });
        }
        rows.sort_by(|a, b| a.path.to_lowercase().cmp(&b.path.to_lowercase()));

        Ok(Outcome::Branches {
            rows,
            local_branches,
            local_commands,
            remote_branches,
            remote_commands,
        })
    }

    fn recall(&mut self, count: u32, all: bool) -> Result<Outcome, StoreError> {
        let id = self.store.current_id();
        let lines = if all {
            let stream = self.store.current_stream()?.clone();
            stream
                .iter()
                .rev()
                .take(count as usize)
                .map(|cmd| RecordLine {
                    branch: Some(self.store.branch_path(&cmd.branch_id)),
                    sequence: cmd.record.sequence,
                    summary: summarize(&self.store, &cmd.branch_id, &cmd.record),
                })
                .collect()
        } else {
            self.store
                .recent_records(&id, count)?
                .iter()
                .rev()
                .map(|record| RecordLine {
                    branch: None,
                    sequence: record.sequence,
                    summary: summarize(&self.store, &id, record),
                })
                .collect()
        };
        Ok(Outcome::Records { lines })
    }

    fn stream(&mut self) -> Result<Outcome, StoreError> {
        let stream = self.store.current_stream()?.clone();
        let lines = stream
            .iter()
            .map(|cmd| RecordLine {
                branch: Some(self.store.branch_path(&cmd.branch_id)),
                sequence: cmd.record.sequence,
                summary: summarize(&self.store, &cmd.branch_id, &cmd.record),
            })
            .collect();
        Ok(Outcome::Stream { lines })
    }

    fn show(&self, reference: &str) -> Result<Outcome, StoreError> {
        let reference: CommandRef = reference.parse()?;
        let from = self.store.current_id();
        let (branch_id, record) = reference.resolve(&self.store, &from)?;
        Ok(Outcome::Shown {
            reference: reference.to_string(),
            branch: self.store.branch_label(&branch_id),
            sequence: record.sequence,
            summary: summarize(&self.store, &branch_id, &record),
        })
    }

    fn status(&self) -> Result<Outcome, StoreError> {
        let store = &self.store;
        let current = store.current();
        Ok(Outcome::Status {
            report: StatusReport {
                store: store.name().to_string(),
                branch: store.branch_label(&current.id),
                position: store.context_label(&current.id),
                command_count: current.command_count,
                behind: store.behind_count(&current.id)?,
                ahead: store.ahead_count(&current.id)?,
                remote: store.is_remote(current),
                completed: current.is_completed,
                upstream: store.info().upstream_location.clone(),
            },
        })
    }

    fn sync_with_upstream(&mut self, push: bool) -> Result<SyncSummary, StoreError> {
        let location = self
            .store
            .info()
            .upstream_location
            .clone()
            .ok_or_else(|| StoreError::NotAClone(self.store.name().to_string()))?;
        let opener = self.upstream.as_ref().ok_or_else(|| {
            StoreError::InvalidCommand(format!("cannot reach upstream {}", location))
        })?;
        let mut upstream = opener(&location)?;

        let summary = if push {
            sync::push(&mut self.store, &mut upstream)?
        } else {
            sync::fetch(&mut self.store, &upstream)?
        };
        upstream.flush()?;
        self.store.flush()?;
        Ok(summary)
    }
}

/// Summary of a record as seen from the branch holding it; a merge from the
/// parent reads `merge ..`.
fn summarize(store: &Store, branch_id: &BranchId, record: &CommandRecord) -> String {
    let parent = store.branch(branch_id).and_then(|b| b.parent_id);
    let summary = record.summary(|id| {
        if Some(id) == parent {
            Some("..".to_string())
        } else {
            store.branch(&id).map(|b| b.name.clone())
        }
    });
    match (&record.payload, store.branch(branch_id)) {
        (Payload::CreateBranch { name, .. }, Some(branch)) if *name != branch.name => {
            format!("{} (now called {})", summary, branch.name)
        }
        _ => summary,
    }
}
