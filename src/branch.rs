//! Branch metadata and merge accounting
//!
//! Ahead/behind counts are answered from counters maintained on every append,
//! never by scanning a branch's log.

use crate::command::{CommandRecord, Payload};
use crate::error::StoreError;
use crate::types::{BranchId, StoreId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a parent recorded the last time it merged from one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeInfo {
    /// Child's command count as of the merge.
    pub child_count: u32,
    /// Child's command discount as of the merge.
    pub child_discount: u32,
    /// Number of times the parent has merged from this child.
    pub parent_discount: u32,
}

/// Persistent metadata for one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub id: BranchId,
    pub parent_id: Option<BranchId>,
    /// Store that owns (and alone may append to) this branch.
    pub store_id: StoreId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub command_count: u32,
    /// Own commands the parent can never merge back: the `CreateBranch`
    /// record, merges from the parent and the `Complete` record.
    pub command_discount: u32,
    /// Leading parent commands incorporated so far.
    pub refresh_count: u32,
    /// Parent merges from this branch accounted for as of the last refresh.
    pub refresh_discount: u32,
    pub last_merge: HashMap<BranchId, MergeInfo>,
    /// Commands pushed upstream (clones only).
    pub last_push: u32,
    pub is_completed: bool,
}

impl BranchInfo {
    /// Metadata for a branch that has no commands yet.
    pub fn new(
        id: BranchId,
        parent_id: Option<BranchId>,
        store_id: StoreId,
        name: impl Into<String>,
        refresh_count: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            parent_id,
            store_id,
            name: name.into(),
            created_at: now,
            updated_at: now,
            command_count: 0,
            command_discount: 0,
            refresh_count,
            refresh_discount: 0,
            last_merge: HashMap::new(),
            last_push: 0,
            is_completed: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Commands this branch still needs from `parent`.
    pub fn behind_count(&self, parent: &BranchInfo) -> Result<u32, StoreError> {
        let parent_discount = parent
            .last_merge
            .get(&self.id)
            .map(|m| m.parent_discount)
            .unwrap_or(0);
        let parent_net = checked_sub(parent.command_count, parent_discount, "parent net")?;
        let refreshed = checked_sub(self.refresh_count, self.refresh_discount, "refresh")?;
        checked_sub(parent_net, refreshed, "behind")
    }

    /// Commands this branch has that `parent` does not.
    pub fn ahead_count(&self, parent: &BranchInfo) -> Result<u32, StoreError> {
        let own = checked_sub(self.command_count, self.command_discount, "own")?;
        let already = match parent.last_merge.get(&self.id) {
            Some(m) => checked_sub(m.child_count, m.child_discount, "merged")?,
            None => 0,
        };
        checked_sub(own, already, "ahead")
    }

    /// Update counters on this branch for a record just appended to it.
    ///
    /// `parent` is this branch's parent as it stands before the append. A merge
    /// from a child is recorded with [`BranchInfo::record_child_merge`] instead,
    /// since it needs the child rather than the parent.
    pub fn record_append(&mut self, record: &CommandRecord, parent: Option<&BranchInfo>) {
        self.command_count += 1;
        self.updated_at = record.created_at;

        match &record.payload {
            Payload::CreateBranch { command_count, .. } => {
                self.command_discount += 1;
                self.refresh_count = *command_count;
                self.refresh_discount = 0;
            }
            Payload::Merge { from_id, .. } if Some(*from_id) == self.parent_id => {
                self.command_discount += 1;
                if let Some(parent) = parent {
                    self.refresh_count = parent.command_count;
                    self.refresh_discount = parent
                        .last_merge
                        .get(&self.id)
                        .map(|m| m.parent_discount)
                        .unwrap_or(0);
                }
            }
            // Completion contributes nothing the parent could merge.
            Payload::Complete => self.command_discount += 1,
            _ => {}
        }
    }

    /// Record on this (parent) branch that it merged up to `max_seq` of `child`.
    pub fn record_child_merge(&mut self, child: &BranchInfo, max_seq: u32) {
        let parent_discount = self
            .last_merge
            .get(&child.id)
            .map(|m| m.parent_discount + 1)
            .unwrap_or(1);
        self.last_merge.insert(
            child.id,
            MergeInfo {
                child_count: max_seq + 1,
                child_discount: child.command_discount,
                parent_discount,
            },
        );
    }
}

fn checked_sub(a: u32, b: u32, what: &str) -> Result<u32, StoreError> {
    a.checked_sub(b)
        .ok_or_else(|| StoreError::NegativeCount(what.to_string()))
}
