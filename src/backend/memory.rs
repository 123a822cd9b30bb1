//! In-memory backend, used by tests and throwaway stores.

use crate::backend::{check_next_sequence, CommandBackend};
use crate::branch::BranchInfo;
use crate::command::CommandRecord;
use crate::error::StorageError;
use crate::store::StoreInfo;
use crate::types::{BranchId, Sequence};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct MemoryState {
    info: Option<StoreInfo>,
    branches: HashMap<BranchId, BranchInfo>,
    records: HashMap<BranchId, Vec<CommandRecord>>,
}

/// Backend holding everything in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandBackend for MemoryBackend {
    fn read_records(
        &self,
        branch_id: &BranchId,
        min: Sequence,
        max: Sequence,
    ) -> Result<Vec<CommandRecord>, StorageError> {
        if min > max {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        let records = state.records.get(branch_id);
        (min..=max)
            .map(|seq| {
                records
                    .and_then(|r| r.get(seq as usize))
                    .cloned()
                    .ok_or(StorageError::MissingRecord {
                        branch_id: *branch_id,
                        sequence: seq,
                    })
            })
            .collect()
    }

    fn write_record(
        &self,
        branch_id: &BranchId,
        record: &CommandRecord,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write();
        let records = state.records.entry(*branch_id).or_default();
        check_next_sequence(branch_id, records.len() as Sequence, record)?;
        records.push(record.clone());
        Ok(())
    }

    fn save_branch(&self, info: &BranchInfo) -> Result<(), StorageError> {
        self.state.write().branches.insert(info.id, info.clone());
        Ok(())
    }

    fn load_branches(&self) -> Result<Vec<BranchInfo>, StorageError> {
        Ok(self.state.read().branches.values().cloned().collect())
    }

    fn find_branch(&self, branch_id: &BranchId) -> Result<Option<BranchInfo>, StorageError> {
        Ok(self.state.read().branches.get(branch_id).cloned())
    }

    fn save_store_info(&self, info: &StoreInfo) -> Result<(), StorageError> {
        self.state.write().info = Some(info.clone());
        Ok(())
    }

    fn load_store_info(&self) -> Result<Option<StoreInfo>, StorageError> {
        Ok(self.state.read().info.clone())
    }
}
