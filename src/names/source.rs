use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{log_prefix, NameDirectory};
use crate::command;
use crate::config::{NameSourceKind, NamesConfig};

/// Boxed future returned by [`NameSource::load`]; boxing lets a chain hold
/// any other source.
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<NameDirectory>> + Send + 'a>>;

/// Where display names come from.
///
/// Uses enum dispatch, matching the fixed set of configurable sources.
#[derive(Debug, Clone)]
pub enum NameSource {
    File(FileSource),
    Command(CommandSource),
    Chained(ChainedSource),
}

impl NameSource {
    /// Builds the source selected by configuration.
    pub fn from_config(cfg: &NamesConfig) -> Self {
        match cfg.source {
            NameSourceKind::File => Self::File(FileSource::new(&cfg.file)),
            NameSourceKind::Command => {
                Self::Command(CommandSource::new(cfg.command.clone(), cfg.timeout))
            }
            NameSourceKind::Chained => Self::Chained(ChainedSource::new(vec![
                Self::Command(CommandSource::new(cfg.command.clone(), cfg.timeout)),
                Self::File(FileSource::new(&cfg.file)),
            ])),
        }
    }

    /// Returns the source name for logging and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Command(_) => "command",
            Self::Chained(_) => "chained",
        }
    }

    /// Load the current directory.
    pub fn load(&self) -> LoadFuture<'_> {
        Box::pin(async move {
            match self {
                Self::File(s) => s.load().await,
                Self::Command(s) => s.load().await,
                Self::Chained(s) => s.load().await,
            }
        })
    }
}

/// JSON object file mapping public key to name.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Relative paths are resolved against the executable's directory.
    pub fn new(path: &Path) -> Self {
        Self {
            path: resolve_relative_to_exe(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file. A missing file yields an empty directory.
    pub async fn load(&self) -> Result<NameDirectory> {
        debug!(path = %self.path.display(), "loading peer names");

        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    path = %self.path.display(),
                    "peer names file not found, using default names",
                );
                return Ok(NameDirectory::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };

        let names: HashMap<String, String> = serde_json::from_str(&data)
            .with_context(|| format!("parsing {}", self.path.display()))?;

        let directory = NameDirectory::from(names);
        log_directory(&directory, "file");

        Ok(directory)
    }
}

/// Command printing an AmneziaVPN clients table.
#[derive(Debug, Clone)]
pub struct CommandSource {
    argv: Vec<String>,
    timeout: Duration,
}

/// One entry of the clients table.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientEntry {
    client_id: Option<String>,
    user_data: Option<UserData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserData {
    client_name: Option<String>,
}

impl CommandSource {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }

    pub async fn load(&self) -> Result<NameDirectory> {
        let output = command::run(&self.argv, self.timeout)
            .await
            .context("running clients table command")?;

        let directory = parse_clients_table(&output)?;
        log_directory(&directory, "command");

        Ok(directory)
    }
}

/// Parse a clients table (JSON array) into a directory.
///
/// Entries without a key or a name are skipped.
pub(crate) fn parse_clients_table(data: &str) -> Result<NameDirectory> {
    let entries: Vec<ClientEntry> =
        serde_json::from_str(data).context("parsing clients table")?;

    let mut directory = NameDirectory::new();
    for entry in entries {
        let name = entry.user_data.and_then(|u| u.client_name);
        match (entry.client_id, name) {
            (Some(id), Some(name)) if !id.is_empty() => directory.insert(id, name),
            (id, _) => {
                debug!(client_id = ?id, "skipping clients table entry without name");
            }
        }
    }

    Ok(directory)
}

/// Tries each source in order; the first non-empty directory wins.
#[derive(Debug, Clone)]
pub struct ChainedSource {
    sources: Vec<NameSource>,
}

impl ChainedSource {
    pub fn new(sources: Vec<NameSource>) -> Self {
        Self { sources }
    }

    /// Fails only when every source failed.
    pub async fn load(&self) -> Result<NameDirectory> {
        let mut last_err = None;
        let mut any_ok = false;

        for source in &self.sources {
            match source.load().await {
                Ok(directory) if !directory.is_empty() => {
                    debug!(source = source.name(), "using peer names");
                    return Ok(directory);
                }
                Ok(_) => {
                    any_ok = true;
                    debug!(source = source.name(), "name source returned no entries");
                }
                Err(e) => {
                    warn!(source = source.name(), error = %format!("{e:#}"), "name source failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if !any_ok => Err(e.context("all name sources failed")),
            _ => Ok(NameDirectory::new()),
        }
    }
}

fn resolve_relative_to_exe(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    match std::env::current_exe() {
        Ok(exe) => match exe.parent() {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        },
        Err(e) => {
            warn!(error = %e, "cannot determine executable location");
            path.to_path_buf()
        }
    }
}

fn log_directory(directory: &NameDirectory, source: &str) {
    info!(source, count = directory.len(), "loaded peer names");
    for (key, name) in directory.iter() {
        debug!(key = %log_prefix(key), client_name = name, "peer name");
    }
}
