//! End-to-end runs of CLI commands against workspaces on disk

use super::test_utils::ENV_MUTEX;
use branchlog::cli::{Cli, RunContext};
use branchlog::StoreError;
use clap::Parser;
use std::path::Path;
use tempfile::TempDir;

fn exec(workspace: &Path, args: &[&str]) -> Result<String, StoreError> {
    let argv = std::iter::once("branchlog").chain(args.iter().copied());
    let cli = Cli::try_parse_from(argv).unwrap();
    RunContext::new(workspace.to_path_buf(), cli.config.clone())?
        .with_branch(cli.branch.clone())
        .with_format(cli.format)
        .execute(&cli.command)
}

fn ok(workspace: &Path, args: &[&str]) -> String {
    match exec(workspace, args) {
        Ok(output) => output,
        Err(e) => panic!("{:?} failed: {}", args, e),
    }
}

#[test]
fn test_init_then_work() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let ws = temp_dir.path();

    let created = ok(ws, &["init", "--name", "A", "--backend", "file"]);
    assert!(created.starts_with("Created store A"));
    assert!(ws.join("config").join("config.toml").exists());
    assert!(ws.join(".branchlog/store/store.json").exists());

    let again = exec(ws, &["init"]).unwrap_err();
    assert!(matches!(again, StoreError::InvalidCommand(_)));

    assert_eq!(ok(ws, &["name", "A1"]), "A[1] = name A1");
    assert_eq!(ok(ws, &["mkdir", "B"]), "Created B (inherits 2 commands)");
    assert_eq!(ok(ws, &["cd", "B"]), "Switched to B");
    // The checked-out branch carries over to the next invocation.
    assert_eq!(ok(ws, &["name", "B1"]), "B[1] = name B1");
    assert_eq!(ok(ws, &["--branch", "/", "name", "A2"]), "A[2] = name A2");

    let status = ok(ws, &["status"]);
    assert!(status.contains("Branch:   B"));
    assert!(status.contains("Behind:   1"));
}

#[test]
fn test_session_commands_need_a_store() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let err = exec(temp_dir.path(), &["status"]).unwrap_err();
    assert!(matches!(err, StoreError::InvalidCommand(_)));
}

#[test]
fn test_clone_push_fetch_between_workspaces() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let origin = temp_dir.path().join("origin");
    let mine = temp_dir.path().join("mine");
    std::fs::create_dir_all(&origin).unwrap();

    ok(&origin, &["init", "--name", "origin"]);
    ok(&origin, &["name", "o1"]);

    let cloned = ok(
        &origin,
        &[
            "clone",
            origin.to_str().unwrap(),
            mine.to_str().unwrap(),
            "--backend",
            "file",
        ],
    );
    assert!(cloned.contains("into mine (1 branch)"));

    assert_eq!(ok(&mine, &["name", "m1"]), "+[1] = name m1");
    assert_eq!(ok(&mine, &["push"]), "Pushed 2 commands in 1 branch");

    assert_eq!(
        ok(&origin, &["merge", "mine"]),
        "Merged [0,1] from mine into origin"
    );
    assert_eq!(ok(&mine, &["fetch"]), "Fetched 1 command in 1 branch");

    let status = ok(&mine, &["status"]);
    assert!(status.contains("Behind:   0"));
    assert!(status.contains("Ahead:    0"));
    assert!(status.contains("Upstream: "));

    let listing = ok(&mine, &["--format", "json", "ls"]);
    let value: serde_json::Value = serde_json::from_str(&listing).unwrap();
    assert_eq!(value["result"], "branches");
    assert_eq!(value["remote_branches"], 1);
    assert_eq!(value["local_branches"], 1);
}

#[test]
fn test_shell_script() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let ws = temp_dir.path();
    ok(ws, &["init", "--name", "A", "--backend", "file"]);

    let script = ws.join("setup.txt");
    std::fs::write(&script, "# build a branch\nname A1\n\ncheckout B -b\nname B1\n").unwrap();
    let arg = format!("@{}", script.display());
    let output = ok(ws, &["shell", &arg]);
    assert_eq!(
        output.lines().collect::<Vec<_>>(),
        vec!["A[1] = name A1", "Switched to B", "B[1] = name B1"]
    );

    let stream = ok(ws, &["stream"]);
    assert!(stream.contains("name B1"));
}
