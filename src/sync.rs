//! Synchronisation between copies of a store
//!
//! A clone keeps the branches it copied from its upstream as remote
//! branches and does its own work on local ones. Push sends the surplus of
//! local branches upstream; fetch brings back the surplus of remote ones.

use crate::backend::CommandBackend;
use crate::branch::BranchInfo;
use crate::command::CommandRecord;
use crate::error::StoreError;
use crate::store::{OpenOptions, Store, StoreInfo};
use crate::types::{new_id, BranchId, IdCount, IdRange, StoreId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Catalog entry describing one branch of a remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub branch_id: BranchId,
    pub command_count: u32,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<BranchId>,
    pub store_id: StoreId,
}

impl From<&BranchInfo> for BranchSummary {
    fn from(info: &BranchInfo) -> Self {
        Self {
            branch_id: info.id,
            command_count: info.command_count,
            created_at: info.created_at,
            parent_id: info.parent_id,
            store_id: info.store_id,
        }
    }
}

/// The serving side of push, fetch and clone.
pub trait RemoteStore {
    fn store_id(&self) -> StoreId;

    /// Every branch known to the store, parents before children.
    fn branch_catalog(&self) -> Vec<BranchSummary>;

    fn branch_info(&self, branch_id: &BranchId) -> Result<BranchInfo, StoreError>;

    /// Ranges the caller is missing (`is_fetch`) or that this store is missing
    /// from the caller (push), given how many commands the caller holds.
    fn missing_ranges(
        &self,
        caller_id: StoreId,
        caller_counts: &[IdCount],
        is_fetch: bool,
    ) -> Vec<IdRange>;

    fn pull_records(&self, range: &IdRange) -> Result<Vec<CommandRecord>, StoreError>;

    /// Accept records pushed by another store. A synthesized local branch is
    /// filed under `source_label`.
    fn push(
        &mut self,
        source_label: &str,
        info: BranchInfo,
        records: &[CommandRecord],
    ) -> Result<(), StoreError>;
}

impl RemoteStore for Store {
    fn store_id(&self) -> StoreId {
        self.id()
    }

    fn branch_catalog(&self) -> Vec<BranchSummary> {
        self.branches().into_iter().map(BranchSummary::from).collect()
    }

    fn branch_info(&self, branch_id: &BranchId) -> Result<BranchInfo, StoreError> {
        Ok(self.require(branch_id)?.clone())
    }

    fn missing_ranges(
        &self,
        caller_id: StoreId,
        caller_counts: &[IdCount],
        is_fetch: bool,
    ) -> Vec<IdRange> {
        let have: HashMap<BranchId, u32> = caller_counts
            .iter()
            .map(|c| (c.branch_id, c.count))
            .collect();
        let mut ranges = Vec::new();

        for branch in self.branches() {
            let ours = branch.command_count;
            match have.get(&branch.id) {
                Some(&theirs) if is_fetch && ours > theirs => {
                    ranges.push(IdRange::new(branch.id, theirs, ours - 1));
                }
                Some(&theirs) if !is_fetch && theirs > ours => {
                    ranges.push(IdRange::new(branch.id, ours, theirs - 1));
                }
                // Branches that started at the caller would only echo back.
                None if is_fetch && branch.store_id != caller_id && ours > 0 => {
                    ranges.push(IdRange::new(branch.id, 0, ours - 1));
                }
                _ => {}
            }
        }

        if !is_fetch {
            for count in caller_counts {
                if count.count > 0 && self.branch(&count.branch_id).is_none() {
                    ranges.push(IdRange::new(count.branch_id, 0, count.count - 1));
                }
            }
        }
        ranges
    }

    fn pull_records(&self, range: &IdRange) -> Result<Vec<CommandRecord>, StoreError> {
        self.records(&range.branch_id, range.min, range.max)
    }

    fn push(
        &mut self,
        source_label: &str,
        info: BranchInfo,
        records: &[CommandRecord],
    ) -> Result<(), StoreError> {
        let branch_id = info.id;
        self.copy_in(info, records, Some(source_label))?;
        if branch_id == self.current_id() {
            self.refresh_models()?;
        }
        Ok(())
    }
}

/// Outcome of a push or fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub branches: usize,
    pub commands: u32,
}

impl SyncSummary {
    fn add(&mut self, range: &IdRange) {
        self.branches += 1;
        self.commands += range.count();
    }
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} command(s) in {} branch(es)",
            self.commands, self.branches
        )
    }
}

/// Send the surplus of every local branch to `upstream`.
pub fn push(local: &mut Store, upstream: &mut dyn RemoteStore) -> Result<SyncSummary, StoreError> {
    check_upstream(local, upstream.store_id())?;

    let have: Vec<IdCount> = local
        .branches()
        .into_iter()
        .filter(|b| !local.is_remote(b))
        .map(|b| IdCount::new(b.id, b.command_count))
        .collect();
    let to_push = upstream.missing_ranges(local.id(), &have, false);

    let mut summary = SyncSummary::default();
    for range in &to_push {
        let info = local.branch_info(&range.branch_id)?;
        let records = local.pull_records(range)?;
        debug!(range = %range, branch = %local.branch_label(&info.id), "Pushing range");
        upstream.push(local.name(), info, &records)?;
        local.set_last_push(&range.branch_id, range.max + 1)?;
        summary.add(range);
    }

    let upstream_id = upstream.store_id().to_string();
    local.save_info(|info| {
        info.push_times.insert(upstream_id, Utc::now());
    })?;
    info!(
        commands = summary.commands,
        branches = summary.branches,
        "Push completed"
    );
    Ok(summary)
}

/// Bring in whatever `upstream` has for branches that are remote here,
/// including branches this store has not seen yet.
pub fn fetch(local: &mut Store, upstream: &dyn RemoteStore) -> Result<SyncSummary, StoreError> {
    check_upstream(local, upstream.store_id())?;

    let have: Vec<IdCount> = local
        .branches()
        .into_iter()
        .filter(|b| local.is_remote(b))
        .map(|b| IdCount::new(b.id, b.command_count))
        .collect();
    let to_fetch = upstream.missing_ranges(local.id(), &have, true);

    let mut summary = SyncSummary::default();
    for range in &to_fetch {
        let info = upstream.branch_info(&range.branch_id)?;
        let records = upstream.pull_records(range)?;
        if local.branch(&range.branch_id).is_none() {
            info!(branch_id = %range.branch_id, name = %info.name, "Fetched new branch");
        } else {
            debug!(range = %range, "Fetching range");
        }
        local.copy_in(info, &records, None)?;
        summary.add(range);
    }
    if !to_fetch.is_empty() {
        local.refresh_models()?;
    }

    info!(
        commands = summary.commands,
        branches = summary.branches,
        "Fetch completed"
    );
    Ok(summary)
}

/// Copy every branch of `upstream` into a new store on `backend`.
///
/// `location` is remembered so that later push and fetch know where the
/// upstream lives.
pub fn clone_store(
    upstream: &dyn RemoteStore,
    backend: Box<dyn CommandBackend>,
    name: &str,
    location: &str,
) -> Result<Store, StoreError> {
    let catalog = upstream.branch_catalog();
    let root_id = catalog
        .iter()
        .find(|b| b.parent_id.is_none())
        .map(|b| b.branch_id)
        .ok_or_else(|| StoreError::MalformedLog("upstream has no root branch".to_string()))?;

    let mut copied = 0u32;
    for summary in &catalog {
        let info = upstream.branch_info(&summary.branch_id)?;
        if info.command_count > 0 {
            let range = IdRange::new(info.id, 0, info.command_count - 1);
            for record in upstream.pull_records(&range)? {
                backend.write_record(&info.id, &record)?;
                copied += 1;
            }
        }
        backend.save_branch(&info)?;
    }

    let mut info = StoreInfo::new(new_id(), name);
    info.upstream_id = Some(upstream.store_id());
    info.upstream_location = Some(location.to_string());
    info.current_branch = Some(root_id);
    backend.save_store_info(&info)?;

    info!(
        store_id = %info.store_id,
        upstream = %location,
        branches = catalog.len(),
        commands = copied,
        "Cloned store"
    );
    Store::open(backend, &OpenOptions::default())
}

fn check_upstream(local: &Store, upstream_id: StoreId) -> Result<(), StoreError> {
    match local.info().upstream_id {
        Some(id) if id == upstream_id => Ok(()),
        Some(id) => Err(StoreError::InvalidCommand(format!(
            "upstream {} does not match recorded upstream {}",
            upstream_id, id
        ))),
        None => Err(StoreError::NotAClone(local.name().to_string())),
    }
}
