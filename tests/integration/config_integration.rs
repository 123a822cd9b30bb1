//! Integration tests for layered configuration

use super::test_utils::ENV_MUTEX;
use branchlog::backend::BackendKind;
use branchlog::cli::RunContext;
use branchlog::config::{global_config_path, BranchlogConfig, ConfigLoader};
use branchlog::StoreError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Sets environment variables for the duration of a test and restores them.
struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        let saved = vars
            .iter()
            .map(|(key, value)| {
                let old = std::env::var(key).ok();
                std::env::set_var(key, value);
                (*key, old)
            })
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.saved.drain(..) {
            match old {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn write_workspace_file(root: &Path, file: &str, text: &str) {
    let dir = root.join("config");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(file), text).unwrap();
}

#[test]
fn test_workspace_files_layer_over_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write_workspace_file(
        root,
        "config.toml",
        "[store]\nbackend = \"file\"\npath = \"data/log\"\n\n[logging]\nlevel = \"info\"\n",
    );
    write_workspace_file(root, "test.toml", "[logging]\nlevel = \"debug\"\n");

    let config = ConfigLoader::load(root).unwrap();
    assert_eq!(config.store.backend, BackendKind::File);
    assert_eq!(config.store.path, PathBuf::from("data/log"));
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.output, "stderr");

    let _env = EnvGuard::set(&[("BRANCHLOG_ENV", "test")]);
    let config = ConfigLoader::load(root).unwrap();
    assert_eq!(config.logging.level, "debug");
    // Keys the environment file leaves alone keep their base values.
    assert_eq!(config.store.backend, BackendKind::File);
}

#[test]
fn test_environment_variables_win() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_workspace_file(root, "config.toml", "[store]\nbackend = \"file\"\n");

    let _env = EnvGuard::set(&[
        ("BRANCHLOG__STORE__BACKEND", "sled"),
        ("BRANCHLOG__STORE__BRANCH", "B/C"),
    ]);
    let config = ConfigLoader::load(root).unwrap();
    assert_eq!(config.store.backend, BackendKind::Sled);
    assert_eq!(config.store.branch.as_deref(), Some("B/C"));
}

#[test]
fn test_global_file_sits_below_workspace() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let xdg = temp_dir.path().join("xdg");
    let home = temp_dir.path().join("home");
    std::fs::create_dir_all(&home).unwrap();
    let _env = EnvGuard::set(&[
        ("HOME", home.to_str().unwrap()),
        ("XDG_CONFIG_HOME", xdg.to_str().unwrap()),
    ]);

    let global = global_config_path().unwrap();
    assert!(global.starts_with(&xdg));
    std::fs::create_dir_all(global.parent().unwrap()).unwrap();
    std::fs::write(
        &global,
        "[store]\nbackend = \"file\"\n\n[logging]\nformat = \"json\"\n",
    )
    .unwrap();

    let workspace = temp_dir.path().join("ws");
    write_workspace_file(&workspace, "config.toml", "[logging]\nformat = \"text\"\n");

    let config = ConfigLoader::load(&workspace).unwrap();
    assert_eq!(config.store.backend, BackendKind::File);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_invalid_config_is_rejected_by_run_context() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_workspace_file(root, "config.toml", "[logging]\nlevel = \"chatty\"\n");

    let err = RunContext::new(root.to_path_buf(), None).err().unwrap();
    match err {
        StoreError::ConfigError(msg) => assert!(msg.contains("chatty")),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_workspace_config_round_trip() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    let mut config = BranchlogConfig::default();
    config.store.backend = BackendKind::File;
    config.store.branch = Some("B".to_string());
    config
        .logging
        .modules
        .insert("branchlog::stream".to_string(), "trace".to_string());
    ConfigLoader::write_workspace_config(root, &config).unwrap();

    let loaded = ConfigLoader::load(root).unwrap();
    assert_eq!(loaded.store, config.store);
    assert_eq!(
        loaded.logging.modules.get("branchlog::stream").map(String::as_str),
        Some("trace")
    );

    let context = RunContext::new(root.to_path_buf(), None).unwrap();
    assert_eq!(context.store_path(), root.join(".branchlog/store"));
}
