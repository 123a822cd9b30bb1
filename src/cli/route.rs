//! CLI route: single route table and run context. Opens the configured store
//! and hands commands to a session; presentation turns outcomes into text.

use crate::backend::{detect_backend, open_backend, BackendKind};
use crate::cli::parse::{Commands, OutputFormat};
use crate::cli::presentation::{format_clone_summary, format_init_summary, format_outcome};
use crate::cli::{command_name, map_error};
use crate::config::{BranchlogConfig, ConfigLoader};
use crate::error::StoreError;
use crate::session::Session;
use crate::store::{OpenOptions, Store};
use crate::sync::{clone_store, RemoteStore};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Runtime context for CLI execution: workspace, loaded configuration and
/// output preferences.
pub struct RunContext {
    workspace_root: PathBuf,
    config: BranchlogConfig,
    branch: Option<String>,
    format: OutputFormat,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, StoreError> {
        let config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        config.ensure_valid()?;

        Ok(Self {
            branch: config.store.branch.clone(),
            workspace_root,
            config,
            format: OutputFormat::Text,
        })
    }

    /// Branch to open on, overriding the configured one.
    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        if branch.is_some() {
            self.branch = branch;
        }
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn config(&self) -> &BranchlogConfig {
        &self.config
    }

    /// Directory holding this workspace's store.
    pub fn store_path(&self) -> PathBuf {
        self.config.store.resolved_path(&self.workspace_root)
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, StoreError> {
        debug!(command = %command_name(command), "Routing command");
        match command {
            Commands::Init { name, backend } => self.init(name.as_deref(), *backend),
            Commands::Clone {
                upstream,
                path,
                name,
                backend,
            } => self.clone_from(upstream, path, name.as_deref(), *backend),
            Commands::Shell { script } => {
                let mut session = self.open_session()?;
                match script {
                    Some(script) => run_script(&mut session, script, self.format),
                    None => {
                        let stdin = std::io::stdin();
                        let stdout = std::io::stdout();
                        run_repl(&mut session, stdin.lock(), stdout.lock(), self.format)?;
                        Ok(String::new())
                    }
                }
            }
            Commands::Session(command) => {
                let mut session = self.open_session()?;
                let outcome = session.run(command)?;
                session.store().flush()?;
                format_outcome(&outcome, self.format)
            }
        }
    }

    fn init(&self, name: Option<&str>, backend: Option<BackendKind>) -> Result<String, StoreError> {
        let path = self.store_path();
        if store_exists(&path) {
            return Err(StoreError::InvalidCommand(format!(
                "A store already exists at {}",
                path.display()
            )));
        }
        let kind = backend.unwrap_or(self.config.store.backend);
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| default_name(&self.workspace_root));

        let store = create_store_at(&path, kind, &name)?;
        if kind != self.config.store.backend || !workspace_config_exists(&self.workspace_root) {
            let mut config = self.config.clone();
            config.store.backend = kind;
            ConfigLoader::write_workspace_config(&self.workspace_root, &config)?;
        }
        info!(store_id = %store.id(), path = %path.display(), "Initialized store");
        format_init_summary(&name, store.id(), &path, kind, self.format)
    }

    fn clone_from(
        &self,
        upstream: &Path,
        target: &Path,
        name: Option<&str>,
        backend: Option<BackendKind>,
    ) -> Result<String, StoreError> {
        let upstream_path = ConfigLoader::load(upstream)?
            .store
            .resolved_path(upstream);
        let upstream_path = upstream_path.canonicalize().map_err(|e| {
            StoreError::InvalidCommand(format!(
                "No store at {}: {}",
                upstream_path.display(),
                e
            ))
        })?;
        let source = open_store_at(&upstream_path, None)?;

        let mut config = BranchlogConfig::default();
        config.store.backend = backend.unwrap_or(self.config.store.backend);
        let path = config.store.resolved_path(target);
        if store_exists(&path) {
            return Err(StoreError::InvalidCommand(format!(
                "A store already exists at {}",
                path.display()
            )));
        }
        check_persistent(config.store.backend)?;
        std::fs::create_dir_all(&path).map_err(crate::error::StorageError::from)?;
        ConfigLoader::write_workspace_config(target, &config)?;

        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| default_name(target));
        let location = upstream_path.display().to_string();
        let clone = clone_store(
            &source,
            open_backend(config.store.backend, &path)?,
            &name,
            &location,
        )?;
        clone.flush()?;
        format_clone_summary(&name, &location, source.branch_catalog().len(), self.format)
    }

    fn open_session(&self) -> Result<Session, StoreError> {
        let path = self.store_path();
        if !store_exists(&path) {
            return Err(StoreError::InvalidCommand(format!(
                "No store at {} (run `branchlog init` first)",
                path.display()
            )));
        }
        let store = open_store_at(&path, self.branch.clone())?;
        Ok(Session::new(store).with_upstream(Box::new(|location: &str| {
            open_store_at(Path::new(location), None)
        })))
    }
}

/// Open the store in `path`, choosing the backend from what is on disk.
pub fn open_store_at(path: &Path, branch: Option<String>) -> Result<Store, StoreError> {
    let backend = open_backend(detect_backend(path), path)?;
    Store::open(backend, &OpenOptions { branch })
}

fn create_store_at(path: &Path, kind: BackendKind, name: &str) -> Result<Store, StoreError> {
    check_persistent(kind)?;
    std::fs::create_dir_all(path).map_err(crate::error::StorageError::from)?;
    let store = Store::create(open_backend(kind, path)?, name)?;
    store.flush()?;
    Ok(store)
}

fn check_persistent(kind: BackendKind) -> Result<(), StoreError> {
    if kind == BackendKind::Memory {
        return Err(StoreError::InvalidCommand(
            "The memory backend cannot hold a workspace store".to_string(),
        ));
    }
    Ok(())
}

fn store_exists(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn workspace_config_exists(root: &Path) -> bool {
    root.join(crate::config::CONFIG_DIR)
        .join("config.toml")
        .exists()
}

fn default_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string())
}

/// Run each line of `@file` (or of `file`), stopping at the first failure.
fn run_script(
    session: &mut Session,
    script: &str,
    format: OutputFormat,
) -> Result<String, StoreError> {
    let path = script.strip_prefix('@').unwrap_or(script);
    let text = std::fs::read_to_string(path).map_err(|e| {
        StoreError::InvalidCommand(format!("Cannot read script {}: {}", path, e))
    })?;

    let mut output = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let outcome = session.execute(line)?;
        output.push(format_outcome(&outcome, format)?);
    }
    session.store().flush()?;
    Ok(output.join("\n"))
}

/// Read commands until `exit`, `quit` or end of input. Failed commands are
/// reported and the loop carries on.
pub fn run_repl<R: BufRead, W: Write>(
    session: &mut Session,
    input: R,
    mut out: W,
    format: OutputFormat,
) -> Result<(), StoreError> {
    let io = |e: std::io::Error| StoreError::Storage(e.into());
    write!(out, "{}", session.prompt()).map_err(io)?;
    out.flush().map_err(io)?;

    for line in input.lines() {
        let line = line.map_err(io)?;
        let line = line.trim();
        match line {
            "" => {}
            "exit" | "quit" => break,
            _ => match session.execute(line).and_then(|o| format_outcome(&o, format)) {
                Ok(text) => writeln!(out, "{}", text).map_err(io)?,
                Err(e) => writeln!(out, "{}", map_error(&e)).map_err(io)?,
            },
        }
        write!(out, "{}", session.prompt()).map_err(io)?;
        out.flush().map_err(io)?;
    }
    session.store().flush()?;
    Ok(())
}
