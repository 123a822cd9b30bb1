//! Persistence backends
//!
//! A backend stores command records and branch metadata for one store. The
//! log layer only relies on the append-only contract below; on-disk formats are
//! each backend's own business.

pub mod file;
pub mod memory;
pub mod persistence;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use persistence::SledBackend;

use crate::branch::BranchInfo;
use crate::command::CommandRecord;
use crate::error::StorageError;
use crate::store::StoreInfo;
use crate::types::{BranchId, Sequence};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Storage contract used by [`crate::store::Store`].
pub trait CommandBackend {
    /// Read records `[min, max]` of a branch in sequence order.
    ///
    /// Fails if any requested sequence has not been written.
    fn read_records(
        &self,
        branch_id: &BranchId,
        min: Sequence,
        max: Sequence,
    ) -> Result<Vec<CommandRecord>, StorageError>;

    /// Append a record. Fails unless `record.sequence` equals the number of
    /// records already stored for the branch.
    fn write_record(&self, branch_id: &BranchId, record: &CommandRecord)
        -> Result<(), StorageError>;

    fn save_branch(&self, info: &BranchInfo) -> Result<(), StorageError>;

    fn load_branches(&self) -> Result<Vec<BranchInfo>, StorageError>;

    fn find_branch(&self, branch_id: &BranchId) -> Result<Option<BranchInfo>, StorageError>;

    fn save_store_info(&self, info: &StoreInfo) -> Result<(), StorageError>;

    fn load_store_info(&self) -> Result<Option<StoreInfo>, StorageError>;

    /// Flush pending writes, for backends that buffer.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

impl<T: CommandBackend + ?Sized> CommandBackend for Arc<T> {
    fn read_records(
        &self,
        branch_id: &BranchId,
        min: Sequence,
        max: Sequence,
    ) -> Result<Vec<CommandRecord>, StorageError> {
        (**self).read_records(branch_id, min, max)
    }

    fn write_record(
        &self,
        branch_id: &BranchId,
        record: &CommandRecord,
    ) -> Result<(), StorageError> {
        (**self).write_record(branch_id, record)
    }

    fn save_branch(&self, info: &BranchInfo) -> Result<(), StorageError> {
        (**self).save_branch(info)
    }

    fn load_branches(&self) -> Result<Vec<BranchInfo>, StorageError> {
        (**self).load_branches()
    }

    fn find_branch(&self, branch_id: &BranchId) -> Result<Option<BranchInfo>, StorageError> {
        (**self).find_branch(branch_id)
    }

    fn save_store_info(&self, info: &StoreInfo) -> Result<(), StorageError> {
        (**self).save_store_info(info)
    }

    fn load_store_info(&self) -> Result<Option<StoreInfo>, StorageError> {
        (**self).load_store_info()
    }

    fn flush(&self) -> Result<(), StorageError> {
        (**self).flush()
    }
}

/// Available backend implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Sled,
    File,
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "sled" => Ok(BackendKind::Sled),
            "file" => Ok(BackendKind::File),
            other => Err(StorageError::UnknownBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Memory => "memory",
            BackendKind::Sled => "sled",
            BackendKind::File => "file",
        };
        f.write_str(name)
    }
}

/// Open a backend of the given kind rooted at `path`.
pub fn open_backend(
    kind: BackendKind,
    path: &Path,
) -> Result<Box<dyn CommandBackend>, StorageError> {
    match kind {
        BackendKind::Memory => Ok(Box::new(MemoryBackend::new())),
        BackendKind::Sled => Ok(Box::new(SledBackend::new(path)?)),
        BackendKind::File => Ok(Box::new(FileBackend::new(path)?)),
    }
}

/// Guess the backend used by an existing store directory.
pub fn detect_backend(path: &Path) -> BackendKind {
    if path.join(file::STORE_FILE).exists() {
        BackendKind::File
    } else {
        BackendKind::Sled
    }
}

/// Check the append-only contract for a write.
pub(crate) fn check_next_sequence(
    branch_id: &BranchId,
    expected: Sequence,
    record: &CommandRecord,
) -> Result<(), StorageError> {
    if record.sequence != expected {
        return Err(StorageError::OutOfSequence {
            branch_id: *branch_id,
            expected,
            actual: record.sequence,
        });
    }
    Ok(())
}
