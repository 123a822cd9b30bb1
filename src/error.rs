//! Error types for the branching command log.

use crate::types::{BranchId, Sequence};
use thiserror::Error;

/// Persistence backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record {sequence} not found in branch {branch_id}")]
    MissingRecord {
        branch_id: BranchId,
        sequence: Sequence,
    },

    #[error("Out-of-sequence write to branch {branch_id}: expected {expected}, got {actual}")]
    OutOfSequence {
        branch_id: BranchId,
        expected: Sequence,
        actual: Sequence,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown storage backend: {0}")]
    UnknownBackend(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Raised by a command processor that cannot handle a command.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProcessorError(pub String);

/// Errors raised by store operations.
///
/// Precondition violations are rejected before anything is written. Integrity
/// failures mean the store's own data is inconsistent and the operation was
/// aborted without a best-effort answer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Branch {0} is remote and cannot be modified")]
    RemoteBranch(String),

    #[error("Branch {0} has been completed")]
    CompletedBranch(String),

    #[error("Unexpected sequence for branch {branch}: expected {expected}, got {actual}")]
    OutOfSequence {
        branch: String,
        expected: Sequence,
        actual: Sequence,
    },

    #[error("Nothing to merge: {0}")]
    NothingToMerge(String),

    #[error("Branch {0} already exists")]
    DuplicateBranchName(String),

    #[error("Invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("Invalid command count {requested} (parent has {available} commands)")]
    InvalidCommandCount { requested: u32, available: u32 },

    #[error("Cannot merge {from} into {into}: branches must be parent and child")]
    NotAdjacent { from: String, into: String },

    #[error("Branch {0} cannot be branched from")]
    CannotBranch(String),

    #[error("Remote branch {0} already has a local child")]
    LocalChildExists(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Branch {branch} is ahead of its parent by {ahead} commands")]
    AheadOfParent { branch: String, ahead: u32 },

    #[error("Branch {0} is local and cannot be replaced by a copy")]
    LocalBranch(String),

    #[error("Store {0} has no upstream")]
    NotAClone(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid command reference: {0}")]
    InvalidReference(String),

    #[error("Processor {processor} rejected a command: {source}")]
    ProcessorFailed {
        processor: String,
        #[source]
        source: ProcessorError,
    },

    #[error("Structural integrity failure: unknown branch {0}")]
    UnknownBranch(BranchId),

    #[error("Structural integrity failure: {0} merge spans were not processed")]
    UnresolvedMergeSpans(usize),

    #[error("Structural integrity failure: {0} count is negative")]
    NegativeCount(String),

    #[error("Structural integrity failure: {0}")]
    MalformedLog(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StoreError {
    /// True for errors that indicate corrupted store data rather than a rejected request.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            StoreError::UnknownBranch(_)
                | StoreError::UnresolvedMergeSpans(_)
                | StoreError::NegativeCount(_)
                | StoreError::MalformedLog(_)
        )
    }
}

impl From<config::ConfigError> for StoreError {
    fn from(err: config::ConfigError) -> Self {
        StoreError::ConfigError(err.to_string())
    }
}
