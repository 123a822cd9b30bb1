//! Command references
//!
//! A reference names a command, or an item the command produced, by its
//! position in a branch: `[3]`, `[3.1]`, `[3.1]color`. A `{..}` prefix points
//! at the parent of the branch holding the reference, `{<branch id>}` at a
//! specific branch.

use crate::command::CommandRecord;
use crate::error::StoreError;
use crate::store::Store;
use crate::types::{BranchId, Sequence};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Branch a reference is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefBranch {
    /// The branch holding the reference.
    Local,
    /// Parent of the branch holding the reference.
    Parent,
    Absolute(BranchId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandRef {
    pub branch: RefBranch,
    pub sequence: Sequence,
    /// Output item of the command; 0 is the command itself.
    pub item: u32,
    /// Property of the item, empty for the whole item.
    pub property: String,
}

impl CommandRef {
    pub fn local(sequence: Sequence) -> Self {
        Self {
            branch: RefBranch::Local,
            sequence,
            item: 0,
            property: String::new(),
        }
    }

    pub fn with_item(mut self, item: u32) -> Self {
        self.item = item;
        self
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    /// Branch referred to when the reference is held by `from`.
    pub fn target_branch(&self, store: &Store, from: &BranchId) -> Result<BranchId, StoreError> {
        match self.branch {
            RefBranch::Local => Ok(store.require(from)?.id),
            RefBranch::Parent => store.require(from)?.parent_id.ok_or_else(|| {
                StoreError::InvalidReference(format!(
                    "{} has no parent for {}",
                    store.branch_label(from),
                    self
                ))
            }),
            RefBranch::Absolute(id) => Ok(store.require(&id)?.id),
        }
    }

    /// Load the referenced command.
    pub fn resolve(
        &self,
        store: &Store,
        from: &BranchId,
    ) -> Result<(BranchId, CommandRecord), StoreError> {
        let branch_id = self.target_branch(store, from)?;
        if self.sequence >= store.require(&branch_id)?.command_count {
            return Err(StoreError::InvalidReference(format!(
                "{} is past the end of {}",
                self,
                store.branch_label(&branch_id)
            )));
        }
        let record = store
            .records(&branch_id, self.sequence, self.sequence)?
            .pop()
            .ok_or_else(|| StoreError::InvalidReference(self.to_string()))?;
        Ok((branch_id, record))
    }
}

impl fmt::Display for CommandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.branch {
            RefBranch::Local => {}
            RefBranch::Parent => write!(f, "{{..}}")?,
            RefBranch::Absolute(id) => write!(f, "{{{}}}", id)?,
        }
        if self.item == 0 {
            write!(f, "[{}]{}", self.sequence, self.property)
        } else {
            write!(f, "[{}.{}]{}", self.sequence, self.item, self.property)
        }
    }
}

impl FromStr for CommandRef {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidReference(s.to_string());

        let (branch, rest) = if let Some(rest) = s.strip_prefix("{..}") {
            (RefBranch::Parent, rest)
        } else if let Some(rest) = s.strip_prefix('{') {
            let (id, rest) = rest.split_once('}').ok_or_else(invalid)?;
            let id = Uuid::parse_str(id).map_err(|_| invalid())?;
            (RefBranch::Absolute(id), rest)
        } else {
            (RefBranch::Local, s)
        };

        let rest = rest.strip_prefix('[').ok_or_else(invalid)?;
        let (position, property) = rest.split_once(']').ok_or_else(invalid)?;
        let (sequence, item) = match position.split_once('.') {
            Some((sequence, item)) => (sequence, Some(item)),
            None => (position, None),
        };
        let sequence = parse_number(sequence).ok_or_else(invalid)?;
        let item = match item {
            Some(item) => parse_number(item).ok_or_else(invalid)?,
            None => 0,
        };

        Ok(Self {
            branch,
            sequence,
            item,
            property: property.to_string(),
        })
    }
}

fn parse_number(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
