//! Stores survive being closed and reopened on the persistent backends

use branchlog::backend::{detect_backend, open_backend, BackendKind};
use branchlog::session::Session;
use branchlog::{OpenOptions, Store};
use std::path::Path;
use tempfile::TempDir;

fn create(kind: BackendKind, path: &Path) -> Session {
    let backend = open_backend(kind, path).unwrap();
    Session::new(Store::create(backend, "A").unwrap())
}

fn reopen(path: &Path, options: &OpenOptions) -> Store {
    let backend = open_backend(detect_backend(path), path).unwrap();
    Store::open(backend, options).unwrap()
}

fn populate(session: &mut Session) {
    for line in [
        "name A1", "mkdir B", "name A2", "cd B", "name B1", "cd ..", "merge B", "cd B",
        "merge ..", "name B2",
    ] {
        session.execute(line).unwrap();
    }
    session.store().flush().unwrap();
}

fn check_reopened(kind: BackendKind) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store");

    let mut session = create(kind, &path);
    populate(&mut session);
    let store = session.into_store();
    let before_root = store.stream(&store.root_id()).unwrap();
    let b = store.resolve_path("/B").unwrap();
    let before_b = store.stream(&b).unwrap();
    let counts = (store.ahead_count(&b).unwrap(), store.behind_count(&b).unwrap());
    drop(store);

    assert_eq!(detect_backend(&path), kind);
    let store = reopen(&path, &OpenOptions::default());

    // The checked-out branch is remembered.
    assert_eq!(store.current_id(), b);
    assert_eq!(store.branches().len(), 2);
    assert_eq!(store.stream(&store.root_id()).unwrap(), before_root);
    assert_eq!(store.stream(&b).unwrap(), before_b);
    assert_eq!(
        (store.ahead_count(&b).unwrap(), store.behind_count(&b).unwrap()),
        counts
    );
    // The parent merged B after A2, so B sees A2 first as well.
    assert_eq!(store.stream(&b).unwrap().names(), vec!["A1", "A2", "B1", "B2"]);
}

#[test]
fn test_sled_store_reopens() {
    check_reopened(BackendKind::Sled);
}

#[test]
fn test_file_store_reopens() {
    check_reopened(BackendKind::File);
}

#[test]
fn test_open_on_requested_branch() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store");
    let mut session = create(BackendKind::File, &path);
    populate(&mut session);
    let root = session.store().root_id();
    drop(session);

    let store = reopen(&path, &OpenOptions::with_branch("/"));
    assert_eq!(store.current_id(), root);

    let store = reopen(&path, &OpenOptions::with_branch(root.to_string()));
    assert_eq!(store.current_id(), root);

    let backend = open_backend(BackendKind::File, &path).unwrap();
    assert!(Store::open(backend, &OpenOptions::with_branch("missing")).is_err());
}

#[test]
fn test_file_layout() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store");
    let mut session = create(BackendKind::File, &path);
    populate(&mut session);

    let root = session.store().root_id();
    assert!(path.join("store.json").exists());
    assert!(path.join("branches").join(format!("{}.json", root)).exists());
    let records = std::fs::read_dir(path.join("records").join(root.to_string()))
        .unwrap()
        .count();
    assert_eq!(
        records as u32,
        session.store().branch(&root).unwrap().command_count
    );
}
