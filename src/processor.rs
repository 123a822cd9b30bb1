//! Command processors
//!
//! Processors consume commands to build application models. Each one names
//! the commands it cares about through a filter. A store hands every relevant
//! command appended to its current branch to its processors, and replays the
//! whole stream when merges, fetches or checkouts change what is visible.

use crate::command::CommandRecord;
use crate::error::{ProcessorError, StoreError};
use crate::stream::{Cmd, Stream};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Decides whether a command is relevant to a processor.
pub trait CmdFilter {
    fn is_relevant(&self, record: &CommandRecord) -> bool;
}

/// Accepts commands whose kind (`Name`, `Complete`, a custom kind, ...) is in a
/// fixed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindFilter {
    kinds: HashSet<String>,
}

impl KindFilter {
    pub fn new<I, S>(kinds: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kinds: HashSet<String> = kinds.into_iter().map(Into::into).collect();
        if kinds.is_empty() {
            return Err(StoreError::InvalidCommand(
                "a kind filter needs at least one kind".to_string(),
            ));
        }
        Ok(Self { kinds })
    }
}

impl CmdFilter for KindFilter {
    fn is_relevant(&self, record: &CommandRecord) -> bool {
        self.kinds.contains(record.kind())
    }
}

/// Consumer of commands.
///
/// `process` must be atomic: on error it leaves its model as it was. When a
/// command is rejected, the processors that had already accepted it are asked
/// to `undo` it, most recent first.
pub trait CommandProcessor {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Commands this processor wants; `None` means all of them.
    fn filter(&self) -> Option<&dyn CmdFilter>;

    fn process(&mut self, cmd: &Cmd) -> Result<(), ProcessorError>;

    /// Revert the last successful `process` of `cmd`.
    fn undo(&mut self, cmd: &Cmd) -> Result<(), ProcessorError>;

    /// Discard the model ahead of a full replay.
    fn reset(&mut self) {}
}

/// Registered processors, in registration order.
#[derive(Default)]
pub struct Processors {
    processors: Vec<Box<dyn CommandProcessor>>,
}

impl Processors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Box<dyn CommandProcessor>) {
        debug!(processor = processor.name(), "Registered command processor");
        self.processors.push(processor);
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Hand `cmd` to every processor whose filter accepts it.
    pub fn apply(&mut self, cmd: &Cmd) -> Result<(), StoreError> {
        let relevant: Vec<usize> = self
            .processors
            .iter()
            .enumerate()
            .filter(|(_, p)| p.filter().map_or(true, |f| f.is_relevant(&cmd.record)))
            .map(|(i, _)| i)
            .collect();

        for (done, &index) in relevant.iter().enumerate() {
            if let Err(source) = self.processors[index].process(cmd) {
                let processor = self.processors[index].name().to_string();
                for &earlier in relevant[..done].iter().rev() {
                    let p = &mut self.processors[earlier];
                    if let Err(e) = p.undo(cmd) {
                        warn!(processor = p.name(), error = %e, "Undo failed");
                    }
                }
                return Err(StoreError::ProcessorFailed { processor, source });
            }
        }
        Ok(())
    }

    /// Rebuild every model from `stream`, stopping at the first rejected command.
    pub fn replay(&mut self, stream: &Stream) -> Result<(), StoreError> {
        for processor in &mut self.processors {
            processor.reset();
        }
        for cmd in stream {
            self.apply(cmd)?;
        }
        debug!(
            branch_id = %stream.branch_id(),
            commands = stream.len(),
            processors = self.processors.len(),
            "Replayed stream into processors"
        );
        Ok(())
    }
}
