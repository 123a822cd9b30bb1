//! Command processors fed by appends and stream replays, and command references

use super::test_utils::{memory_session, run, stream_names};
use branchlog::backend::MemoryBackend;
use branchlog::cli::{format_outcome, OutputFormat};
use branchlog::session::{Outcome, Session};
use branchlog::stream::Cmd;
use branchlog::sync::clone_store;
use branchlog::{
    CmdFilter, CommandProcessor, KindFilter, OpenOptions, Payload, ProcessorError, Store,
    StoreError,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Model of the labels visible from the current branch. Refuses `forbidden`.
struct Labels {
    filter: KindFilter,
    model: Rc<RefCell<Vec<String>>>,
}

fn labels(session: &mut Session) -> Rc<RefCell<Vec<String>>> {
    let model = Rc::new(RefCell::new(Vec::new()));
    session
        .store_mut()
        .register_processor(Box::new(Labels {
            filter: KindFilter::new(["Name"]).unwrap(),
            model: model.clone(),
        }))
        .unwrap();
    model
}

impl CommandProcessor for Labels {
    fn name(&self) -> &str {
        "labels"
    }

    fn filter(&self) -> Option<&dyn CmdFilter> {
        Some(&self.filter)
    }

    fn process(&mut self, cmd: &Cmd) -> Result<(), ProcessorError> {
        match &cmd.record.payload {
            Payload::Name { name } if name == "forbidden" => {
                Err(ProcessorError(format!("{} is not allowed", name)))
            }
            Payload::Name { name } => {
                self.model.borrow_mut().push(name.clone());
                Ok(())
            }
            other => Err(ProcessorError(format!("unexpected {}", other.kind()))),
        }
    }

    fn undo(&mut self, _cmd: &Cmd) -> Result<(), ProcessorError> {
        self.model.borrow_mut().pop();
        Ok(())
    }

    fn reset(&mut self) {
        self.model.borrow_mut().clear();
    }
}

#[test]
fn test_registration_replays_existing_commands() {
    let mut s = memory_session("A");
    run(&mut s, &["name A1", "name A2"]);
    let model = labels(&mut s);
    assert_eq!(*model.borrow(), vec!["A1", "A2"]);

    run(&mut s, &["name A3", "complete"]);
    assert_eq!(*model.borrow(), vec!["A1", "A2", "A3"]);
}

#[test]
fn test_model_follows_checkout_and_merge() {
    let mut s = memory_session("A");
    let model = labels(&mut s);
    run(&mut s, &["name A1", "mkdir B", "cd B", "name B1"]);
    assert_eq!(*model.borrow(), vec!["A1", "B1"]);

    run(&mut s, &["cd ..", "name A2"]);
    assert_eq!(*model.borrow(), vec!["A1", "A2"]);

    // Appends to other branches are not visible here until merged.
    run(&mut s, &["cd B", "name B2", "cd .."]);
    assert_eq!(*model.borrow(), vec!["A1", "A2"]);

    run(&mut s, &["merge B"]);
    assert_eq!(*model.borrow(), stream_names(&s));
    assert_eq!(*model.borrow(), vec!["A1", "A2", "B1", "B2"]);
}

#[test]
fn test_rejected_command_stays_in_the_log() {
    let mut s = memory_session("A");
    let model = labels(&mut s);
    run(&mut s, &["name A1", "name forbidden"]);

    assert_eq!(*model.borrow(), vec!["A1"]);
    assert_eq!(s.store().current().command_count, 3);
    match s.store().last_processing_error() {
        Some(StoreError::ProcessorFailed { processor, source }) => {
            assert_eq!(processor, "labels");
            assert_eq!(source.to_string(), "forbidden is not allowed");
        }
        other => panic!("unexpected processing state: {:?}", other),
    }

    run(&mut s, &["name A3"]);
    assert!(s.store().last_processing_error().is_none());
    assert_eq!(*model.borrow(), vec!["A1", "A3"]);
}

#[test]
fn test_replay_stops_at_a_rejected_command() {
    let mut s = memory_session("A");
    run(&mut s, &["name A1", "name forbidden", "name A3"]);
    let model = labels(&mut s);

    assert_eq!(*model.borrow(), vec!["A1"]);
    assert!(matches!(
        s.store().last_processing_error(),
        Some(StoreError::ProcessorFailed { .. })
    ));
}

#[test]
fn test_fetch_refreshes_models() {
    let upstream = Arc::new(MemoryBackend::new());
    let origin = Store::create(Box::new(upstream.clone()), "origin").unwrap();
    let mut origin = Session::new(origin);
    run(&mut origin, &["name o1"]);

    let clone = clone_store(origin.store(), Box::new(MemoryBackend::new()), "bob", "origin").unwrap();
    let backend = upstream.clone();
    let mut bob = Session::new(clone).with_upstream(Box::new(move |_location: &str| {
        Store::open(Box::new(backend.clone()), &OpenOptions::default())
    }));
    let model = labels(&mut bob);
    assert_eq!(*model.borrow(), vec!["o1"]);

    run(&mut origin, &["name o2"]);
    drop(origin);
    run(&mut bob, &["fetch"]);
    assert_eq!(*model.borrow(), vec!["o1", "o2"]);
}

#[test]
fn test_show_reference() {
    let mut s = memory_session("A");
    run(&mut s, &["name A1", "mkdir B", "cd B", "name B1"]);

    let outcome = s.execute("show [1]").unwrap();
    assert_eq!(
        outcome,
        Outcome::Shown {
            reference: "[1]".to_string(),
            branch: "B".to_string(),
            sequence: 1,
            summary: "name B1".to_string(),
        }
    );
    assert_eq!(
        format_outcome(&outcome, OutputFormat::Text).unwrap(),
        "[1] -> B[1] = name B1"
    );

    let root = s.store().root_id();
    let Outcome::Shown { branch, summary, .. } = s.execute(&format!("show {{{}}}[1]", root)).unwrap()
    else {
        panic!("expected a shown command");
    };
    assert_eq!((branch.as_str(), summary.as_str()), ("A", "name A1"));

    for bad in ["show 1", "show [x]", "show {..}[7]"] {
        assert!(
            matches!(s.execute(bad).unwrap_err(), StoreError::InvalidReference(_)),
            "{} was accepted",
            bad
        );
    }
    run(&mut s, &["cd .."]);
    assert!(matches!(
        s.execute("show {..}[0]").unwrap_err(),
        StoreError::InvalidReference(_)
    ));
}
