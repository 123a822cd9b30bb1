//! Command Store
//!
//! A store owns the branch tree for one copy of a command log. Branches live in
//! an arena keyed by id; parent and child relations are id lookups into it.
//! Every append goes through [`Store::append_record`], which enforces the
//! append preconditions and keeps the merge accounting current.

use crate::backend::CommandBackend;
use crate::branch::BranchInfo;
use crate::command::{CommandRecord, Payload};
use crate::error::StoreError;
use crate::merge::{resolve_merge_range, MergeDirection};
use crate::processor::{CommandProcessor, Processors};
use crate::stream::{Cmd, Stream, StreamBuilder};
use crate::types::{new_id, BranchId, IdRange, Sequence, StoreId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name given to the local child synthesized under a remote branch.
pub const LOCAL_BRANCH_NAME: &str = "+";

/// Store-level metadata persisted alongside the branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub store_id: StoreId,
    pub name: String,
    /// Store this one was cloned from.
    pub upstream_id: Option<StoreId>,
    pub upstream_location: Option<String>,
    /// Last successful push, keyed by upstream store id.
    pub push_times: BTreeMap<String, DateTime<Utc>>,
    /// Branch that was checked out when the store was last used.
    pub current_branch: Option<BranchId>,
}

impl StoreInfo {
    pub fn new(store_id: StoreId, name: impl Into<String>) -> Self {
        Self {
            store_id,
            name: name.into(),
            upstream_id: None,
            upstream_location: None,
            push_times: BTreeMap::new(),
            current_branch: None,
        }
    }
}

/// Options for [`Store::open`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Branch to check out, as an id or a path from the root. When absent the
    /// branch recorded in the store is used, then the root.
    pub branch: Option<String>,
}

impl OpenOptions {
    pub fn with_branch(branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
        }
    }
}

/// A command log with its branch tree and the currently checked-out branch.
pub struct Store {
    info: StoreInfo,
    backend: Box<dyn CommandBackend>,
    branches: HashMap<BranchId, BranchInfo>,
    root_id: BranchId,
    current: BranchId,
    stream_cache: Option<Stream>,
    processors: Processors,
    /// Why the processors rejected the last command handed to them.
    processing_error: Option<StoreError>,
}

impl Store {
    /// Create a new store whose root branch starts with a `CreateStore` record.
    pub fn create(backend: Box<dyn CommandBackend>, name: &str) -> Result<Self, StoreError> {
        let store_id = new_id();
        let mut info = StoreInfo::new(store_id, name);
        info.current_branch = Some(store_id);

        let record = CommandRecord::new(
            0,
            Payload::CreateStore {
                store_id,
                name: name.to_string(),
            },
        );
        let mut root = BranchInfo::new(store_id, None, store_id, name, 0);
        backend.write_record(&store_id, &record)?;
        root.record_append(&record, None);
        backend.save_branch(&root)?;
        backend.save_store_info(&info)?;

        info!(store_id = %store_id, name = %name, "Created command store");

        let mut branches = HashMap::new();
        branches.insert(store_id, root);
        Ok(Self {
            info,
            backend,
            branches,
            root_id: store_id,
            current: store_id,
            stream_cache: None,
            processors: Processors::new(),
            processing_error: None,
        })
    }

    /// Open an existing store and rebuild its branch tree from metadata.
    pub fn open(
        backend: Box<dyn CommandBackend>,
        options: &OpenOptions,
    ) -> Result<Self, StoreError> {
        let info = backend
            .load_store_info()?
            .ok_or_else(|| StoreError::MalformedLog("store metadata is missing".to_string()))?;

        let branches: HashMap<BranchId, BranchInfo> = backend
            .load_branches()?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        let mut roots = branches.values().filter(|b| b.is_root());
        let root_id = match (roots.next(), roots.next()) {
            (Some(root), None) => root.id,
            _ => {
                return Err(StoreError::MalformedLog(format!(
                    "store {} must have exactly one root branch",
                    info.name
                )))
            }
        };
        for branch in branches.values() {
            if let Some(parent_id) = branch.parent_id {
                if !branches.contains_key(&parent_id) {
                    return Err(StoreError::UnknownBranch(parent_id));
                }
            }
        }

        let mut store = Self {
            current: root_id,
            info,
            backend,
            branches,
            root_id,
            stream_cache: None,
            processors: Processors::new(),
            processing_error: None,
        };

        store.current = match &options.branch {
            Some(branch) => store.resolve_branch_ref(branch)?,
            None => store
                .info
                .current_branch
                .filter(|id| store.branches.contains_key(id))
                .unwrap_or(root_id),
        };

        debug!(
            store_id = %store.info.store_id,
            branches = store.branches.len(),
            "Opened command store"
        );
        Ok(store)
    }

    pub fn id(&self) -> StoreId {
        self.info.store_id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &StoreInfo {
        &self.info
    }

    pub fn root_id(&self) -> BranchId {
        self.root_id
    }

    pub fn current_id(&self) -> BranchId {
        self.current
    }

    pub fn current(&self) -> &BranchInfo {
        &self.branches[&self.current]
    }

    pub fn branch(&self, id: &BranchId) -> Option<&BranchInfo> {
        self.branches.get(id)
    }

    /// Look up a branch that must exist.
    pub fn require(&self, id: &BranchId) -> Result<&BranchInfo, StoreError> {
        self.branches.get(id).ok_or(StoreError::UnknownBranch(*id))
    }

    /// All branches, parents before children.
    pub fn branches(&self) -> Vec<&BranchInfo> {
        let mut out = Vec::with_capacity(self.branches.len());
        let mut pending = vec![self.root_id];
        while let Some(id) = pending.pop() {
            if let Some(branch) = self.branches.get(&id) {
                out.push(branch);
                let mut children: Vec<BranchId> =
                    self.children(&id).iter().map(|c| c.id).collect();
                children.reverse();
                pending.extend(children);
            }
        }
        out
    }

    /// Children of a branch ordered by creation time.
    pub fn children(&self, id: &BranchId) -> Vec<&BranchInfo> {
        let mut children: Vec<&BranchInfo> = self
            .branches
            .values()
            .filter(|b| b.parent_id == Some(*id))
            .collect();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        children
    }

    pub fn child_by_name(&self, parent: &BranchId, name: &str) -> Option<&BranchInfo> {
        self.branches
            .values()
            .find(|b| b.parent_id == Some(*parent) && b.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn backend(&self) -> &dyn CommandBackend {
        self.backend.as_ref()
    }

    /// True when the branch is owned by another store.
    pub fn is_remote(&self, branch: &BranchInfo) -> bool {
        branch.store_id != self.info.store_id
    }

    /// Whether a new child may be created under the branch.
    ///
    /// A remote branch whose ancestry reaches a local branch is somebody's
    /// pushed-in work; it can be merged from but not extended here.
    pub fn can_branch(&self, branch: &BranchInfo) -> bool {
        if !self.is_remote(branch) {
            return true;
        }
        let mut parent = branch.parent_id;
        while let Some(id) = parent {
            match self.branches.get(&id) {
                Some(p) if !self.is_remote(p) => return false,
                Some(p) => parent = p.parent_id,
                None => return false,
            }
        }
        true
    }

    /// Path of a branch below the root, e.g. `B/C`. The root itself is `""`.
    pub fn branch_path(&self, id: &BranchId) -> String {
        let mut names = Vec::new();
        let mut at = self.branches.get(id);
        while let Some(branch) = at {
            if branch.is_root() {
                break;
            }
            names.push(branch.name.as_str());
            at = branch.parent_id.and_then(|p| self.branches.get(&p));
        }
        names.reverse();
        names.join("/")
    }

    /// Label for the next command on a branch, e.g. `B[3]`.
    pub fn context_label(&self, id: &BranchId) -> String {
        let count = self.branches.get(id).map(|b| b.command_count).unwrap_or(0);
        format!("{}[{}]", self.branch_path(id), count)
    }

    /// Commands `id` still needs from its parent (0 for the root).
    pub fn behind_count(&self, id: &BranchId) -> Result<u32, StoreError> {
        let branch = self.require(id)?;
        match branch.parent_id {
            Some(parent_id) => branch.behind_count(self.require(&parent_id)?),
            None => Ok(0),
        }
    }

    /// Commands `id` has that its parent does not (0 for the root).
    pub fn ahead_count(&self, id: &BranchId) -> Result<u32, StoreError> {
        let branch = self.require(id)?;
        match branch.parent_id {
            Some(parent_id) => branch.ahead_count(self.require(&parent_id)?),
            None => Ok(0),
        }
    }

    /// Resolve a branch path relative to the current branch.
    ///
    /// Accepts `..`, `/`, absolute paths such as `/B/C` and relative paths such
    /// as `C/D` or `../C`. Names compare case-insensitively.
    pub fn resolve_path(&self, path: &str) -> Result<BranchId, StoreError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(StoreError::BranchNotFound(path.to_string()));
        }
        let (mut at, rest) = match path.strip_prefix('/') {
            Some(rest) => (self.root_id, rest),
            None => (self.current, path),
        };
        for part in rest.split('/').filter(|p| !p.is_empty()) {
            at = match part {
                "." => at,
                ".." => self
                    .require(&at)?
                    .parent_id
                    .ok_or_else(|| StoreError::BranchNotFound(path.to_string()))?,
                name => {
                    self.child_by_name(&at, name)
                        .ok_or_else(|| StoreError::BranchNotFound(path.to_string()))?
                        .id
                }
            };
        }
        Ok(at)
    }

    fn resolve_branch_ref(&self, branch: &str) -> Result<BranchId, StoreError> {
        if let Ok(id) = Uuid::parse_str(branch) {
            if self.branches.contains_key(&id) {
                return Ok(id);
            }
        }
        let absolute = if branch.starts_with('/') {
            branch.to_string()
        } else {
            format!("/{}", branch)
        };
        self.resolve_path(&absolute)
    }

    /// Switch the current branch and remember it in the store metadata.
    pub fn checkout(&mut self, path: &str) -> Result<BranchId, StoreError> {
        let id = self.resolve_path(path)?;
        self.set_current(id)?;
        Ok(id)
    }

    fn set_current(&mut self, id: BranchId) -> Result<(), StoreError> {
        self.require(&id)?;
        if self.info.current_branch != Some(id) {
            self.save_info(|info| info.current_branch = Some(id))?;
        }
        if self.current != id {
            self.current = id;
            self.stream_cache = None;
            self.refresh_models()?;
        }
        Ok(())
    }

    /// Create a child of the current branch inheriting its first
    /// `command_count` commands (all of them by default).
    pub fn create_branch(
        &mut self,
        name: &str,
        command_count: Option<u32>,
    ) -> Result<BranchId, StoreError> {
        validate_branch_name(name)?;
        let parent = self.current();
        if !self.can_branch(parent) {
            return Err(StoreError::CannotBranch(self.branch_label(&parent.id)));
        }
        let count = command_count.unwrap_or(parent.command_count);
        self.create_child(self.current, name, count)
    }

    fn create_child(
        &mut self,
        parent_id: BranchId,
        name: &str,
        command_count: u32,
    ) -> Result<BranchId, StoreError> {
        let parent = self.require(&parent_id)?;
        if command_count == 0 || command_count > parent.command_count {
            return Err(StoreError::InvalidCommandCount {
                requested: command_count,
                available: parent.command_count,
            });
        }
        if self.child_by_name(&parent_id, name).is_some() {
            return Err(StoreError::DuplicateBranchName(name.to_string()));
        }

        let id = new_id();
        let record = CommandRecord::new(
            0,
            Payload::CreateBranch {
                name: name.to_string(),
                command_count,
            },
        );
        let mut branch = BranchInfo::new(id, Some(parent_id), self.info.store_id, name, 0);
        self.backend.write_record(&id, &record)?;
        branch.record_append(&record, Some(parent));
        self.backend.save_branch(&branch)?;

        info!(
            branch_id = %id,
            parent_id = %parent_id,
            name = %name,
            command_count,
            "Created branch"
        );
        self.branches.insert(id, branch);
        Ok(id)
    }

    /// Create the local child `+` of the current remote branch and switch to it.
    pub fn create_local(&mut self) -> Result<BranchId, StoreError> {
        let current = self.current();
        if !self.is_remote(current) {
            return Err(StoreError::InvalidCommand(format!(
                "{} is already a local branch",
                self.branch_label(&current.id)
            )));
        }
        if !self.can_branch(current) {
            return Err(StoreError::CannotBranch(self.branch_label(&current.id)));
        }
        let current_id = current.id;
        if self
            .children(&current_id)
            .iter()
            .any(|c| !self.is_remote(c))
        {
            return Err(StoreError::LocalChildExists(self.branch_label(&current_id)));
        }
        let count = current.command_count;
        let id = self.create_child(current_id, LOCAL_BRANCH_NAME, count)?;
        self.set_current(id)?;
        Ok(id)
    }

    /// Append a leaf command to the current branch.
    ///
    /// On a remote branch the command lands on a freshly created local child.
    pub fn append(&mut self, payload: Payload) -> Result<CommandRecord, StoreError> {
        match payload {
            Payload::CreateStore { .. } | Payload::CreateBranch { .. } | Payload::Merge { .. } => {
                return Err(StoreError::InvalidCommand(format!(
                    "{} records are created by their own operations",
                    payload.kind()
                )))
            }
            _ => {}
        }
        if self.is_remote(self.current()) {
            self.create_local()?;
        }
        self.append_record(self.current, payload)
    }

    /// Merge into the current branch from its parent (`..`) or from a child.
    pub fn merge(&mut self, from: &str) -> Result<IdRange, StoreError> {
        let source_id = self.resolve_path(from)?;
        let target = self.current();
        let source = self.require(&source_id)?;

        let (direction, range) = resolve_merge_range(target, source)?;
        match direction {
            MergeDirection::FromParent => {
                if self.behind_count(&target.id)? == 0 {
                    return Err(StoreError::NothingToMerge(format!(
                        "{} is up to date with its parent",
                        self.branch_label(&target.id)
                    )));
                }
            }
            MergeDirection::FromChild => {
                if self.ahead_count(&source.id)? == 0 {
                    return Err(StoreError::NothingToMerge(format!(
                        "{} has nothing new",
                        self.branch_label(&source.id)
                    )));
                }
            }
        }

        self.append_record(
            self.current,
            Payload::Merge {
                from_id: range.branch_id,
                min_seq: range.min,
                max_seq: range.max,
            },
        )?;
        info!(
            into = %self.current,
            from = %range.branch_id,
            min = range.min,
            max = range.max,
            "Merged commands"
        );
        self.refresh_models()?;
        Ok(range)
    }

    /// Mark the current branch completed. Its parent must already have
    /// everything it contributed.
    pub fn complete(&mut self) -> Result<(), StoreError> {
        let current = self.current();
        if self.is_remote(current) {
            return Err(StoreError::RemoteBranch(self.branch_label(&current.id)));
        }
        let ahead = self.ahead_count(&current.id)?;
        if ahead > 0 {
            return Err(StoreError::AheadOfParent {
                branch: self.branch_label(&current.id),
                ahead,
            });
        }
        let id = current.id;
        self.append_record(id, Payload::Complete)?;
        let mut completed = self.require(&id)?.clone();
        completed.is_completed = true;
        self.backend.save_branch(&completed)?;
        self.branches.insert(id, completed);
        info!(branch_id = %id, "Completed branch");
        Ok(())
    }

    /// Append a record to a branch, enforcing append preconditions and
    /// updating merge accounting.
    pub(crate) fn append_record(
        &mut self,
        branch_id: BranchId,
        payload: Payload,
    ) -> Result<CommandRecord, StoreError> {
        let branch = self.require(&branch_id)?;
        if self.is_remote(branch) {
            return Err(StoreError::RemoteBranch(self.branch_label(&branch_id)));
        }
        if branch.is_completed {
            return Err(StoreError::CompletedBranch(self.branch_label(&branch_id)));
        }

        let parent = match branch.parent_id {
            Some(parent_id) => Some(self.require(&parent_id)?.clone()),
            None => None,
        };
        let child = match &payload {
            Payload::Merge { from_id, .. } if Some(*from_id) != branch.parent_id => {
                Some(self.require(from_id)?.clone())
            }
            _ => None,
        };

        let record = CommandRecord::new(branch.command_count, payload);
        self.backend.write_record(&branch_id, &record)?;

        // Counters are updated on a copy and swapped in once persisted.
        let mut updated = self.require(&branch_id)?.clone();
        updated.record_append(&record, parent.as_ref());
        if let (Some(child), Payload::Merge { max_seq, .. }) = (&child, &record.payload) {
            updated.record_child_merge(child, *max_seq);
        }
        self.backend.save_branch(&updated)?;
        self.branches.insert(branch_id, updated);
        self.stream_cache = None;

        // Merges change what is visible; the caller replays the stream instead.
        if branch_id == self.current && !record.payload.is_merge() {
            self.dispatch(Cmd {
                branch_id,
                record: record.clone(),
            });
        }

        debug!(
            branch_id = %branch_id,
            sequence = record.sequence,
            kind = record.kind(),
            "Appended command"
        );
        Ok(record)
    }

    /// Copy records and metadata from another store into this one.
    ///
    /// New branches are attached under their (already present) parent; a
    /// synthesized local branch is renamed to `alt_name`. Existing branches
    /// must be remote here and receive the records as a continuation.
    pub(crate) fn copy_in(
        &mut self,
        mut info: BranchInfo,
        records: &[CommandRecord],
        alt_name: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut expected = match self.branches.get(&info.id) {
            Some(existing) => {
                if !self.is_remote(existing) {
                    return Err(StoreError::LocalBranch(self.branch_label(&existing.id)));
                }
                info.name = existing.name.clone();
                existing.command_count
            }
            None => {
                let parent_id = info.parent_id.ok_or_else(|| {
                    StoreError::MalformedLog(format!("copied branch {} has no parent", info.id))
                })?;
                self.require(&parent_id)?;
                if info.name == LOCAL_BRANCH_NAME {
                    if let Some(alt) = alt_name {
                        info.name = alt.to_string();
                    }
                }
                if self.child_by_name(&parent_id, &info.name).is_some() {
                    return Err(StoreError::DuplicateBranchName(info.name.clone()));
                }
                0
            }
        };

        for record in records {
            if record.sequence != expected {
                return Err(StoreError::OutOfSequence {
                    branch: info.name.clone(),
                    expected,
                    actual: record.sequence,
                });
            }
            self.backend.write_record(&info.id, record)?;
            expected += 1;
        }
        if info.command_count != expected {
            return Err(StoreError::MalformedLog(format!(
                "branch {} claims {} commands but {} were copied",
                info.name, info.command_count, expected
            )));
        }

        self.backend.save_branch(&info)?;
        debug!(
            branch_id = %info.id,
            copied = records.len(),
            "Copied branch records"
        );
        self.branches.insert(info.id, info);
        self.stream_cache = None;
        Ok(())
    }

    /// Replace local bookkeeping for a branch after it was pushed upstream.
    pub(crate) fn set_last_push(&mut self, id: &BranchId, count: u32) -> Result<(), StoreError> {
        let mut branch = self.require(id)?.clone();
        branch.last_push = count;
        self.backend.save_branch(&branch)?;
        self.branches.insert(*id, branch);
        Ok(())
    }

    pub(crate) fn save_info(&mut self, update: impl FnOnce(&mut StoreInfo)) -> Result<(), StoreError> {
        let mut info = self.info.clone();
        update(&mut info);
        self.backend.save_store_info(&info)?;
        self.info = info;
        Ok(())
    }

    /// Register a processor and bring its model up to date with the current
    /// branch.
    pub fn register_processor(
        &mut self,
        processor: Box<dyn CommandProcessor>,
    ) -> Result<(), StoreError> {
        self.processors.register(processor);
        self.refresh_models()
    }

    /// Error from the last time commands were handed to the processors. The
    /// commands themselves stay in the log either way.
    pub fn last_processing_error(&self) -> Option<&StoreError> {
        self.processing_error.as_ref()
    }

    fn dispatch(&mut self, cmd: Cmd) {
        self.processing_error = None;
        if let Err(e) = self.processors.apply(&cmd) {
            warn!(branch_id = %cmd.branch_id, sequence = cmd.record.sequence, error = %e, "Command processing failed");
            self.processing_error = Some(e);
        }
    }

    /// Rebuild processor models from the current branch's stream.
    pub(crate) fn refresh_models(&mut self) -> Result<(), StoreError> {
        self.processing_error = None;
        if self.processors.is_empty() {
            return Ok(());
        }
        let stream = self.stream(&self.current)?;
        if let Err(e) = self.processors.replay(&stream) {
            warn!(branch_id = %self.current, error = %e, "Replaying stream into processors failed");
            self.processing_error = Some(e);
        }
        self.stream_cache = Some(stream);
        Ok(())
    }

    /// Read `[min, max]` of a branch from the backend.
    pub fn records(
        &self,
        id: &BranchId,
        min: Sequence,
        max: Sequence,
    ) -> Result<Vec<CommandRecord>, StoreError> {
        Ok(self.backend.read_records(id, min, max)?)
    }

    /// Most recent `count` records of a branch, oldest first.
    pub fn recent_records(&self, id: &BranchId, count: u32) -> Result<Vec<CommandRecord>, StoreError> {
        let branch = self.require(id)?;
        if branch.command_count == 0 || count == 0 {
            return Ok(Vec::new());
        }
        let max = branch.command_count - 1;
        let min = branch.command_count.saturating_sub(count);
        self.records(id, min, max)
    }

    /// Reconstruct the stream visible from a branch.
    pub fn stream(&self, id: &BranchId) -> Result<Stream, StoreError> {
        StreamBuilder::new(self).build(id)
    }

    /// Stream for the current branch, rebuilt only after an append or checkout.
    pub fn current_stream(&mut self) -> Result<&Stream, StoreError> {
        let stale = match &self.stream_cache {
            Some(stream) => stream.branch_id() != self.current,
            None => true,
        };
        if stale {
            self.stream_cache = Some(self.stream(&self.current)?);
        }
        self.stream_cache
            .as_ref()
            .ok_or_else(|| StoreError::MalformedLog("stream cache is empty".to_string()))
    }

    /// Display name of a branch: its path, or the store name for the root.
    pub fn branch_label(&self, id: &BranchId) -> String {
        if *id == self.root_id {
            return match self.branches.get(id) {
                Some(root) => root.name.clone(),
                None => self.info.name.clone(),
            };
        }
        self.branch_path(id)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        Ok(self.backend.flush()?)
    }
}

fn validate_branch_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with(LOCAL_BRANCH_NAME)
        || name.contains('/')
        || name.chars().any(char::is_whitespace);
    if invalid {
        return Err(StoreError::InvalidBranchName(name.to_string()));
    }
    Ok(())
}
