//! Core type definitions shared across the command log.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Branch identifier. Globally unique and stable for the life of the branch.
pub type BranchId = Uuid;

/// Store identifier. The root branch of a store created locally shares this id.
pub type StoreId = Uuid;

/// Zero-based position of a command record within its branch.
pub type Sequence = u32;

/// Allocate a fresh identifier for a store or branch.
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// Inclusive range of sequence numbers within one branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdRange {
    pub branch_id: BranchId,
    pub min: Sequence,
    pub max: Sequence,
}

impl IdRange {
    pub fn new(branch_id: BranchId, min: Sequence, max: Sequence) -> Self {
        Self { branch_id, min, max }
    }

    /// Number of sequence numbers covered by the range.
    pub fn count(&self) -> u32 {
        self.max - self.min + 1
    }
}

impl std::fmt::Display for IdRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{},{}]", self.branch_id, self.min, self.max)
    }
}

/// Number of commands a caller holds for one branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCount {
    pub branch_id: BranchId,
    pub count: u32,
}

impl IdCount {
    pub fn new(branch_id: BranchId, count: u32) -> Self {
        Self { branch_id, count }
    }
}
