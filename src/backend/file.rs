//! JSON file backend
//!
//! Layout under the root directory:
//! `store.json`, `branches/{branch_id}.json` and `records/{branch_id}/{seq}.json`.
//! Every write goes to a `.tmp` sibling first and is renamed into place.

use crate::backend::{check_next_sequence, CommandBackend};
use crate::branch::BranchInfo;
use crate::command::CommandRecord;
use crate::error::StorageError;
use crate::store::StoreInfo;
use crate::types::{BranchId, Sequence};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const STORE_FILE: &str = "store.json";

/// Human-readable store kept as individual JSON files.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `root`, creating directories as needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        for dir in [root.join("branches"), root.join("records")] {
            fs::create_dir_all(&dir).map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory {:?}: {}", dir, e),
                ))
            })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn branch_path(&self, branch_id: &BranchId) -> PathBuf {
        self.root.join("branches").join(format!("{}.json", branch_id))
    }

    fn records_dir(&self, branch_id: &BranchId) -> PathBuf {
        self.root.join("records").join(branch_id.to_string())
    }

    fn record_path(&self, branch_id: &BranchId, sequence: Sequence) -> PathBuf {
        self.records_dir(branch_id)
            .join(format!("{:08}.json", sequence))
    }

    fn record_count(&self, branch_id: &BranchId) -> Result<Sequence, StorageError> {
        let dir = self.records_dir(branch_id);
        if !dir.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().extension().map(|e| e == "json").unwrap_or(false) {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| StorageError::Serialization(format!("Failed to serialize {:?}: {}", path, e)))?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &bytes).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to write {:?}: {}", temp_path, e),
        ))
    })?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to rename temp file to {:?}: {}", path, e),
        ))
    })?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let value = serde_json::from_slice(&bytes).map_err(|e| {
        StorageError::Serialization(format!("Failed to deserialize {:?}: {}", path, e))
    })?;
    Ok(Some(value))
}

impl CommandBackend for FileBackend {
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
            let record = read_json(&self.record_path(branch_id, seq))?.ok_or(
                StorageError::MissingRecord {
                    branch_id: *branch_id,
                    sequence: seq,
                },
            )?;
            out.push(record);
        }
        Ok(out)
    }

    fn write_record(
        &self,
        branch_id: &BranchId,
        record: &CommandRecord,
    ) -> Result<(), StorageError> {
        check_next_sequence(branch_id, self.record_count(branch_id)?, record)?;
        write_json(&self.record_path(branch_id, record.sequence), record)
    }

    fn save_branch(&self, info: &BranchInfo) -> Result<(), StorageError> {
        write_json(&self.branch_path(&info.id), info)
    }

    fn load_branches(&self) -> Result<Vec<BranchInfo>, StorageError> {
        let mut branches = Vec::new();
        for entry in fs::read_dir(self.root.join("branches"))? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(info) = read_json(&path)? {
                    branches.push(info);
                }
            }
        }
        Ok(branches)
    }

    fn find_branch(&self, branch_id: &BranchId) -> Result<Option<BranchInfo>, StorageError> {
        read_json(&self.branch_path(branch_id))
    }

    fn save_store_info(&self, info: &StoreInfo) -> Result<(), StorageError> {
        write_json(&self.root.join(STORE_FILE), info)
    }

    fn load_store_info(&self) -> Result<Option<StoreInfo>, StorageError> {
        read_json(&self.root.join(STORE_FILE))
    }
}
