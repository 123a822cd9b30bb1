//! Command records
//!
//! A command record is the immutable unit appended to a branch. The payload is a
//! closed union over the kinds the log itself interprets, plus leaf kinds that
//! are opaque to merge accounting and stream reconstruction.

use crate::types::{BranchId, Sequence, StoreId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Payload carried by a command record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// First record of a store's root branch.
    CreateStore { store_id: StoreId, name: String },

    /// First record of every non-root branch. `command_count` is the number of
    /// leading parent commands the new branch inherits.
    CreateBranch { name: String, command_count: u32 },

    /// Pull `[min_seq, max_seq]` of `from_id` into the branch holding this record.
    Merge {
        from_id: BranchId,
        min_seq: Sequence,
        max_seq: Sequence,
    },

    /// Appended just before a branch is flagged as completed.
    Complete,

    /// Labels a point in a branch's history.
    Name { name: String },

    /// Application-defined leaf command.
    Custom {
        kind: String,
        fields: BTreeMap<String, String>,
    },
}

impl Payload {
    /// Discriminator naming how the payload is interpreted.
    pub fn kind(&self) -> &str {
        match self {
            Payload::CreateStore { .. } => "CreateStore",
            Payload::CreateBranch { .. } => "CreateBranch",
            Payload::Merge { .. } => "Merge",
            Payload::Complete => "Complete",
            Payload::Name { .. } => "Name",
            Payload::Custom { kind, .. } => kind,
        }
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, Payload::Merge { .. })
    }

    /// Source branch of a merge record.
    pub fn merge_source(&self) -> Option<BranchId> {
        match self {
            Payload::Merge { from_id, .. } => Some(*from_id),
            _ => None,
        }
    }
}

/// An immutable, sequence-numbered command stored in exactly one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub sequence: Sequence,
    pub created_at: DateTime<Utc>,
    pub payload: Payload,
}

impl CommandRecord {
    pub fn new(sequence: Sequence, payload: Payload) -> Self {
        Self {
            sequence,
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> &str {
        self.payload.kind()
    }

    /// One-line description used by recall and stream listings.
    pub fn summary(&self, resolve: impl Fn(BranchId) -> Option<String>) -> String {
        match &self.payload {
            Payload::CreateStore { name, .. } => format!("create store {}", name),
            Payload::CreateBranch {
                name,
                command_count,
            } => format!("branch {} {}", name, command_count),
            Payload::Merge {
                from_id,
                min_seq,
                max_seq,
            } => {
                let from = resolve(*from_id).unwrap_or_else(|| from_id.to_string());
                format!("merge {} [{},{}]", from, min_seq, max_seq)
            }
            Payload::Complete => "complete".to_string(),
            Payload::Name { name } => format!("name {}", name),
            Payload::Custom { kind, fields } => {
                if fields.is_empty() {
                    kind.clone()
                } else {
                    let args: Vec<String> =
                        fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                    format!("{} {}", kind, args.join(" "))
                }
            }
        }
    }
}
