//! Sled persistence backend

use crate::backend::{check_next_sequence, CommandBackend};
use crate::branch::BranchInfo;
use crate::command::CommandRecord;
use crate::error::StorageError;
use crate::store::StoreInfo;
use crate::types::{BranchId, Sequence};
use bincode;
use sled;
use std::path::Path;

const STORE_INFO_KEY: &[u8] = b"store";

/// Sled-based implementation of CommandBackend
///
/// Records live in the `records` tree keyed by branch id bytes followed by the
/// big-endian sequence, so a prefix scan walks one branch in order.
pub struct SledBackend {
    db: sled::Db,
    branches: sled::Tree,
    records: sled::Tree,
    meta: sled::Tree,
}

impl SledBackend {
    /// Open (or create) a sled database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| io_error("open sled database", e))?;
        Self::from_db(db)
    }

    /// Build the backend over an already opened database.
    pub fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let branches = db
            .open_tree("branches")
            .map_err(|e| io_error("open branches tree", e))?;
        let records = db
            .open_tree("records")
            .map_err(|e| io_error("open records tree", e))?;
        let meta = db
            .open_tree("meta")
            .map_err(|e| io_error("open meta tree", e))?;
        Ok(Self {
            db,
            branches,
            records,
            meta,
        })
    }

    /// Number of records stored for a branch.
    fn record_count(&self, branch_id: &BranchId) -> Result<Sequence, StorageError> {
        match self.records.scan_prefix(branch_id.as_bytes()).next_back() {
            Some(item) => {
                let (key, _) = item.map_err(|e| io_error("scan records", e))?;
                Ok(sequence_from_key(&key)? + 1)
            }
            None => Ok(0),
        }
    }
}

fn record_key(branch_id: &BranchId, sequence: Sequence) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..16].copy_from_slice(branch_id.as_bytes());
    key[16..].copy_from_slice(&sequence.to_be_bytes());
    key
}

fn sequence_from_key(key: &[u8]) -> Result<Sequence, StorageError> {
    let tail: [u8; 4] = key
        .get(16..20)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| StorageError::Serialization(format!("Malformed record key {:?}", key)))?;
    Ok(Sequence::from_be_bytes(tail))
}

fn io_error(action: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("Failed to {}: {}", action, e),
    ))
}

fn encode<T: serde::Serialize>(value: &T, what: &str) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value)
        .map_err(|e| StorageError::Serialization(format!("Failed to serialize {}: {}", what, e)))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, StorageError> {
    bincode::deserialize(bytes)
        .map_err(|e| StorageError::Serialization(format!("Failed to deserialize {}: {}", what, e)))
}

impl CommandBackend for SledBackend {
    fn read_records(
        &self,
        branch_id: &BranchId,
        min: Sequence,
        max: Sequence,
    ) -> Result<Vec<CommandRecord>, StorageError> {
        let mut out = Vec::new();
        if min > max {
            return Ok(out);
        }
        for seq in min..=max {
            let value = self
                .records
                .get(record_key(branch_id, seq))
                .map_err(|e| io_error("get command record", e))?
                .ok_or(StorageError::MissingRecord {
                    branch_id: *branch_id,
                    sequence: seq,
                })?;
            out.push(decode(&value, "command record")?);
        }
        Ok(out)
    }

    fn write_record(
        &self,
        branch_id: &BranchId,
        record: &CommandRecord,
    ) -> Result<(), StorageError> {
        check_next_sequence(branch_id, self.record_count(branch_id)?, record)?;
        let value = encode(record, "command record")?;
        self.records
            .insert(record_key(branch_id, record.sequence), value)
            .map_err(|e| io_error("put command record", e))?;
        Ok(())
    }

    fn save_branch(&self, info: &BranchInfo) -> Result<(), StorageError> {
        let value = encode(info, "branch metadata")?;
        self.branches
            .insert(info.id.as_bytes(), value)
            .map_err(|e| io_error("put branch metadata", e))?;
        Ok(())
    }

    fn load_branches(&self) -> Result<Vec<BranchInfo>, StorageError> {
        let mut branches = Vec::new();
        for item in self.branches.iter() {
            let (_, value) = item.map_err(|e| io_error("iterate branches", e))?;
            branches.push(decode(&value, "branch metadata")?);
        }
        Ok(branches)
    }

    fn find_branch(&self, branch_id: &BranchId) -> Result<Option<BranchInfo>, StorageError> {
        match self
            .branches
            .get(branch_id.as_bytes())
            .map_err(|e| io_error("get branch metadata", e))?
        {
            Some(value) => Ok(Some(decode(&value, "branch metadata")?)),
            None => Ok(None),
        }
    }

    fn save_store_info(&self, info: &StoreInfo) -> Result<(), StorageError> {
        let value = encode(info, "store info")?;
        self.meta
            .insert(STORE_INFO_KEY, value)
            .map_err(|e| io_error("put store info", e))?;
        Ok(())
    }

    fn load_store_info(&self) -> Result<Option<StoreInfo>, StorageError> {
        match self
            .meta
            .get(STORE_INFO_KEY)
            .map_err(|e| io_error("get store info", e))?
        {
            Some(value) => Ok(Some(decode(&value, "store info")?)),
            None => Ok(None),
        }
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(|e| io_error("flush database", e))?;
        Ok(())
    }
}
