//! Stream reconstruction
//!
//! Linearizes everything visible from a branch into one duplicate-free,
//! causally ordered sequence of commands.
//!
//! Work is expressed as merge spans: "records `[min, max]` of `source` are
//! visible to `target`". Spans are walked backward over an explicit frame
//! stack. A merge record pulling from the span's own target is a reciprocal
//! merge: the rest of the span is deferred onto a record in the target's log
//! and resumed when the target walk reaches that record. Deferred spans live
//! in a map owned by the builder; records are never modified.

use crate::command::{CommandRecord, Payload};
use crate::error::StoreError;
use crate::store::Store;
use crate::types::{BranchId, Sequence};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// A command record paired with the branch that physically holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    pub branch_id: BranchId,
    pub record: CommandRecord,
}

impl Cmd {
    pub fn sequence(&self) -> Sequence {
        self.record.sequence
    }
}

/// Reconstructed history of one branch, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    branch_id: BranchId,
    cmds: Vec<Cmd>,
}

impl Stream {
    /// Branch the stream was built for.
    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    pub fn cmds(&self) -> &[Cmd] {
        &self.cmds
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cmd> {
        self.cmds.iter()
    }

    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// `(branch, sequence)` of every command in order.
    pub fn keys(&self) -> Vec<(BranchId, Sequence)> {
        self.cmds
            .iter()
            .map(|c| (c.branch_id, c.record.sequence))
            .collect()
    }

    /// Labels of the `Name` commands in order.
    pub fn names(&self) -> Vec<&str> {
        self.cmds
            .iter()
            .filter_map(|c| match &c.record.payload {
                Payload::Name { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a Stream {
    type Item = &'a Cmd;
    type IntoIter = std::slice::Iter<'a, Cmd>;

    fn into_iter(self) -> Self::IntoIter {
        self.cmds.iter()
    }
}

/// Records `[min, max]` of `source` that are visible to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSpan {
    pub source: BranchId,
    pub min: Sequence,
    pub max: Sequence,
    pub target: BranchId,
}

impl MergeSpan {
    pub fn new(source: BranchId, min: Sequence, max: Sequence, target: BranchId) -> Self {
        Self {
            source,
            min,
            max,
            target,
        }
    }
}

/// A span being walked. `next` is the next sequence to visit, `None` once the
/// walk has passed `span.min`.
struct Frame {
    span: MergeSpan,
    next: Option<Sequence>,
    /// Deferred spans on the merge at `next` have been scheduled; the merge
    /// itself is handled when this frame is on top again.
    merge_pending: bool,
}

impl Frame {
    fn new(span: MergeSpan) -> Self {
        Self {
            span,
            next: Some(span.max),
            merge_pending: false,
        }
    }

    fn step_back(&mut self, from: Sequence) {
        self.next = if from > self.span.min {
            Some(from - 1)
        } else {
            None
        };
    }
}

/// One reconstruction over a store. Branch logs are loaded at most once.
pub struct StreamBuilder<'a> {
    store: &'a Store,
    data: HashMap<BranchId, Vec<CommandRecord>>,
    deferred: HashMap<(BranchId, Sequence), Vec<MergeSpan>>,
    stack: Vec<Frame>,
    /// Emitted commands, newest first.
    emitted: Vec<(BranchId, Sequence)>,
    seen: HashSet<(BranchId, Sequence)>,
}

impl<'a> StreamBuilder<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            data: HashMap::new(),
            deferred: HashMap::new(),
            stack: Vec::new(),
            emitted: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Build the stream for `target`. Either the whole traversal succeeds and
    /// every deferred span was resumed, or an error is returned.
    pub fn build(mut self, target: &BranchId) -> Result<Stream, StoreError> {
        let store = self.store;
        let Some(max) = store.require(target)?.command_count.checked_sub(1) else {
            return Ok(Stream {
                branch_id: *target,
                cmds: Vec::new(),
            });
        };

        self.run(MergeSpan::new(*target, 0, max, *target))?;
        self.link_ancestors(*target)?;

        let unresolved: usize = self.deferred.values().map(Vec::len).sum();
        if unresolved > 0 {
            return Err(StoreError::UnresolvedMergeSpans(unresolved));
        }

        let mut cmds = Vec::with_capacity(self.emitted.len());
        for (branch_id, seq) in self.emitted.iter().rev() {
            let record = self.record(branch_id, *seq)?.clone();
            cmds.push(Cmd {
                branch_id: *branch_id,
                record,
            });
        }

        debug!(branch_id = %target, commands = cmds.len(), "Reconstructed stream");
        Ok(Stream {
            branch_id: *target,
            cmds,
        })
    }

    /// Add the portion of each ancestor's log that predates the point where
    /// the branch below it split off.
    fn link_ancestors(&mut self, target: BranchId) -> Result<(), StoreError> {
        let store = self.store;
        let mut child = store.require(&target)?;
        while let Some(parent_id) = child.parent_id {
            let (last_branch, last_seq) = *self.emitted.last().ok_or_else(|| {
                StoreError::MalformedLog("stream is empty before ancestors".to_string())
            })?;

            let max = if last_branch == child.id && last_seq == 0 {
                match &self.record(&child.id, 0)?.payload {
                    Payload::CreateBranch { command_count, .. } => command_count.checked_sub(1),
                    other => {
                        return Err(StoreError::MalformedLog(format!(
                            "branch {} starts with {} instead of CreateBranch",
                            child.name,
                            other.kind()
                        )))
                    }
                }
            } else if last_branch == parent_id {
                last_seq.checked_sub(1)
            } else {
                return Err(StoreError::MalformedLog(format!(
                    "history of branch {} does not reach its parent",
                    child.name
                )));
            };

            if let Some(max) = max {
                self.run(MergeSpan::new(parent_id, 0, max, child.id))?;
            }
            child = store.require(&parent_id)?;
        }
        Ok(())
    }

    /// Process a span and everything it leads to until the stack is empty.
    fn run(&mut self, span: MergeSpan) -> Result<(), StoreError> {
        self.load(&span.source)?;
        self.stack.push(Frame::new(span));

        while let Some(frame) = self.stack.last() {
            let top = self.stack.len() - 1;
            let span = frame.span;
            let merge_pending = frame.merge_pending;
            let Some(seq) = frame.next else {
                self.stack.pop();
                continue;
            };

            let merge = match &self.record(&span.source, seq)?.payload {
                Payload::Merge {
                    from_id,
                    min_seq,
                    max_seq,
                } => Some((*from_id, *min_seq, *max_seq)),
                _ => None,
            };

            let Some((from_id, min_seq, max_seq)) = merge else {
                self.emit(span.source, seq)?;
                self.stack[top].step_back(seq);
                self.resume_deferred(span.source, seq)?;
                continue;
            };

            if !merge_pending {
                // Spans waiting on this merge run before the merge itself.
                self.stack[top].merge_pending = true;
                self.resume_deferred(span.source, seq)?;
                continue;
            }
            self.stack[top].merge_pending = false;

            if from_id == span.target {
                // Reciprocal merge: the rest of this span is resumed from the
                // target side.
                self.stack.pop();
                if seq > span.min {
                    let rest = MergeSpan::new(span.source, span.min, seq - 1, span.target);
                    self.defer(rest, min_seq, max_seq)?;
                }
            } else {
                self.stack[top].step_back(seq);
                self.load(&from_id)?;
                trace!(from = %from_id, min_seq, max_seq, into = %span.source, "Following merge");
                self.stack
                    .push(Frame::new(MergeSpan::new(from_id, min_seq, max_seq, span.source)));
            }
        }
        Ok(())
    }

    /// Schedule spans deferred onto `(branch, seq)`, first-deferred first.
    fn resume_deferred(&mut self, branch: BranchId, seq: Sequence) -> Result<(), StoreError> {
        if let Some(spans) = self.deferred.remove(&(branch, seq)) {
            for span in spans.into_iter().rev() {
                self.load(&span.source)?;
                self.stack.push(Frame::new(span));
            }
        }
        Ok(())
    }

    /// Attach `rest` to the target record where it must be resumed: the latest
    /// merge in `[min_seq, max_seq]` of the target that pulled from
    /// `rest.source`, or else the record at `min_seq`.
    fn defer(
        &mut self,
        rest: MergeSpan,
        min_seq: Sequence,
        max_seq: Sequence,
    ) -> Result<(), StoreError> {
        self.load(&rest.target)?;
        let mut inject_at = min_seq;
        for seq in (min_seq..=max_seq).rev() {
            if self.record(&rest.target, seq)?.payload.merge_source() == Some(rest.source) {
                inject_at = seq;
                break;
            }
        }
        trace!(
            source = %rest.source,
            min = rest.min,
            max = rest.max,
            target = %rest.target,
            inject_at,
            "Deferring merge span"
        );
        self.deferred
            .entry((rest.target, inject_at))
            .or_default()
            .push(rest);
        Ok(())
    }

    fn emit(&mut self, branch: BranchId, seq: Sequence) -> Result<(), StoreError> {
        if !self.seen.insert((branch, seq)) {
            return Err(StoreError::MalformedLog(format!(
                "record {} of branch {} is reachable twice",
                seq, branch
            )));
        }
        self.emitted.push((branch, seq));
        Ok(())
    }

    fn load(&mut self, branch: &BranchId) -> Result<(), StoreError> {
        if self.data.contains_key(branch) {
            return Ok(());
        }
        let store = self.store;
        let records = match store.require(branch)?.command_count {
            0 => Vec::new(),
            count => store.records(branch, 0, count - 1)?,
        };
        self.data.insert(*branch, records);
        Ok(())
    }

    fn record(&self, branch: &BranchId, seq: Sequence) -> Result<&CommandRecord, StoreError> {
        self.data
            .get(branch)
            .and_then(|records| records.get(seq as usize))
            .ok_or_else(|| {
                StoreError::MalformedLog(format!(
                    "merge span refers to missing record {} of branch {}",
                    seq, branch
                ))
            })
    }
}
