//! Shared helpers for integration tests

use branchlog::backend::MemoryBackend;
use branchlog::session::Session;
use branchlog::Store;
use std::sync::Mutex;

/// Serializes tests that set process environment variables.
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

pub fn memory_store(name: &str) -> Store {
    Store::create(Box::new(MemoryBackend::new()), name).unwrap()
}

pub fn memory_session(name: &str) -> Session {
    Session::new(memory_store(name))
}

/// Execute each line, failing the test with the offending line on error.
pub fn run(session: &mut Session, lines: &[&str]) {
    for line in lines {
        if let Err(e) = session.execute(line) {
            panic!("`{}` failed: {}", line, e);
        }
    }
}

/// Names visible from the current branch, in stream order.
pub fn stream_names(session: &Session) -> Vec<String> {
    let store = session.store();
    store
        .stream(&store.current_id())
        .unwrap()
        .names()
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn ahead_behind(session: &Session) -> (u32, u32) {
    let store = session.store();
    let id = store.current_id();
    (
        store.ahead_count(&id).unwrap(),
        store.behind_count(&id).unwrap(),
    )
}
