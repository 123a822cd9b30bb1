//! Clone, push and fetch between stores sharing an upstream

use super::test_utils::{ahead_behind, memory_session, run, stream_names};
use branchlog::backend::MemoryBackend;
use branchlog::session::{Outcome, Session};
use branchlog::sync::clone_store;
use branchlog::{OpenOptions, Store, StoreError};
use std::sync::Arc;

fn open(backend: &Arc<MemoryBackend>) -> Store {
    Store::open(Box::new(backend.clone()), &OpenOptions::default()).unwrap()
}

/// Upstream `origin` with `o1` on the root and `b1` on child `B`.
fn origin() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    let store = Store::create(Box::new(backend.clone()), "origin").unwrap();
    let mut session = Session::new(store);
    run(&mut session, &["name o1", "mkdir B", "cd B", "name b1", "cd .."]);
    backend
}

fn upstream_session(backend: &Arc<MemoryBackend>) -> Session {
    Session::new(open(backend))
}

fn clone_session(upstream: &Arc<MemoryBackend>, name: &str) -> Session {
    let source = open(upstream);
    let clone = clone_store(&source, Box::new(MemoryBackend::new()), name, "origin").unwrap();
    let backend = upstream.clone();
    Session::new(clone).with_upstream(Box::new(move |_location: &str| {
        Store::open(Box::new(backend.clone()), &OpenOptions::default())
    }))
}

#[test]
fn test_clone_copies_every_branch_as_remote() {
    let upstream = origin();
    let s = clone_session(&upstream, "bob");
    let store = s.store();

    assert_eq!(store.branches().len(), 2);
    assert!(store.branches().iter().all(|b| store.is_remote(b)));
    assert!(store.branches().iter().all(|b| store.can_branch(b)));
    assert_eq!(store.current_id(), store.root_id());
    assert_eq!(store.info().upstream_id, Some(open(&upstream).id()));
    assert_eq!(store.info().upstream_location.as_deref(), Some("origin"));
    assert_eq!(stream_names(&s), vec!["o1"]);
}

#[test]
fn test_push_merge_fetch_round_trip() {
    let upstream = origin();
    let mut bob = clone_session(&upstream, "bob");

    // Work on a remote branch lands on its local child.
    run(&mut bob, &["name a1"]);
    assert_eq!(bob.store().current().name, "+");
    assert_eq!(stream_names(&bob), vec!["o1", "a1"]);

    let pushed = bob.execute("push").unwrap();
    assert_eq!(
        pushed,
        Outcome::Pushed {
            commands: 2,
            branches: 1
        }
    );
    assert_eq!(bob.store().current().last_push, 2);
    let origin_id = open(&upstream).id().to_string();
    assert!(bob.store().info().push_times.contains_key(&origin_id));

    // Upstream files the pushed branch under the clone's name.
    let mut up = upstream_session(&upstream);
    let pushed_id = up.store().resolve_path("/bob").unwrap();
    let pushed_branch = up.store().branch(&pushed_id).unwrap().clone();
    assert!(up.store().is_remote(&pushed_branch));
    assert!(!up.store().can_branch(&pushed_branch));
    run(&mut up, &["cd /", "merge bob"]);
    assert_eq!(stream_names(&up), vec!["o1", "a1"]);
    drop(up);

    let fetched = bob.execute("fetch").unwrap();
    assert_eq!(
        fetched,
        Outcome::Fetched {
            commands: 1,
            branches: 1
        }
    );
    assert_eq!(ahead_behind(&bob), (0, 0));
    assert_eq!(stream_names(&bob), vec!["o1", "a1"]);

    // Nothing new either way.
    assert_eq!(
        bob.execute("push").unwrap(),
        Outcome::Pushed {
            commands: 0,
            branches: 0
        }
    );
    assert_eq!(
        bob.execute("fetch").unwrap(),
        Outcome::Fetched {
            commands: 0,
            branches: 0
        }
    );
}

#[test]
fn test_fetch_brings_new_branches() {
    let upstream = origin();
    let mut bob = clone_session(&upstream, "bob");

    let mut up = upstream_session(&upstream);
    run(&mut up, &["cd /", "mkdir C", "cd C", "name c1", "cd /B", "name b2"]);
    drop(up);

    let fetched = bob.execute("fetch").unwrap();
    assert_eq!(
        fetched,
        Outcome::Fetched {
            commands: 3,
            branches: 2
        }
    );

    run(&mut bob, &["cd /C"]);
    assert!(bob.store().is_remote(bob.store().current()));
    assert_eq!(stream_names(&bob), vec!["o1", "c1"]);
    run(&mut bob, &["cd /B"]);
    assert_eq!(stream_names(&bob), vec!["o1", "b1", "b2"]);
}

#[test]
fn test_pushed_branch_grows_on_later_pushes() {
    let upstream = origin();
    let mut bob = clone_session(&upstream, "bob");
    run(&mut bob, &["name a1", "push", "name a2"]);

    assert_eq!(ahead_behind(&bob), (2, 0));
    assert_eq!(
        bob.execute("push").unwrap(),
        Outcome::Pushed {
            commands: 1,
            branches: 1
        }
    );
    assert_eq!(bob.store().current().last_push, 3);

    let mut up = upstream_session(&upstream);
    let id = up.store().resolve_path("/bob").unwrap();
    assert_eq!(up.store().branch(&id).unwrap().command_count, 3);

    run(&mut up, &["cd /bob"]);
    let Outcome::Records { lines } = up.execute("recall").unwrap() else {
        panic!("expected records");
    };
    let summaries: Vec<&str> = lines.iter().map(|l| l.summary.as_str()).collect();
    assert_eq!(
        summaries,
        vec!["name a2", "name a1", "branch + 2 (now called bob)"]
    );
}

#[test]
fn test_remote_branch_has_one_local_child() {
    let upstream = origin();
    let mut bob = clone_session(&upstream, "bob");
    run(&mut bob, &["name a1", "cd .."]);

    let err = bob.store_mut().create_local().unwrap_err();
    assert!(matches!(err, StoreError::LocalChildExists(_)));
}

#[test]
fn test_local_branches_under_remote_parents() {
    let upstream = origin();
    let mut bob = clone_session(&upstream, "bob");
    run(&mut bob, &["mkdir X", "cd X", "name x1"]);

    assert!(!bob.store().is_remote(bob.store().current()));
    run(&mut bob, &["cd /B"]);
    assert!(matches!(
        bob.execute("complete").unwrap_err(),
        StoreError::RemoteBranch(_)
    ));
}

#[test]
fn test_sync_requires_an_upstream() {
    let mut s = memory_session("A");
    assert!(matches!(
        s.execute("push").unwrap_err(),
        StoreError::NotAClone(_)
    ));
    assert!(matches!(
        s.execute("fetch").unwrap_err(),
        StoreError::NotAClone(_)
    ));
}
