//! branchlog: a branching, mergeable command log
//!
//! Commands are appended to branches organized in a tree. Merge records pull
//! ranges of commands between a branch and its parent or children, and copies
//! of a store exchange work through push and fetch. Any branch can be
//! linearized into the duplicate-free stream of commands visible from it.

pub mod backend;
pub mod branch;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod merge;
pub mod processor;
pub mod reference;
pub mod session;
pub mod store;
pub mod stream;
pub mod sync;
pub mod types;

pub use command::{CommandRecord, Payload};
pub use error::{ProcessorError, StorageError, StoreError};
pub use processor::{CmdFilter, CommandProcessor, KindFilter, Processors};
pub use reference::{CommandRef, RefBranch};
pub use store::{OpenOptions, Store, StoreInfo};
pub use stream::Stream;
