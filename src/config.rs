use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for the exporter.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics server listen address. Default: ":9586".
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Pause between the end of one cycle and the start of the next. Default: 30s.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Peer dump source configuration.
    #[serde(default)]
    pub dump: DumpConfig,

    /// Peer name source configuration.
    #[serde(default)]
    pub names: NamesConfig,

    /// Consecutive cycles a peer may be missing from the dump before its
    /// series are removed. 0 keeps series forever. Default: 10.
    #[serde(default = "default_stale_after_cycles")]
    pub stale_after_cycles: u64,
}

/// Peer dump source configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpConfig {
    /// Command printing `wg show all dump` output.
    #[serde(default = "default_dump_command")]
    pub command: Vec<String>,

    /// Maximum time the dump command may run. Default: 10s.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Which name source to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSourceKind {
    /// JSON object file mapping public key to name.
    #[default]
    File,
    /// Command printing an AmneziaVPN clients table.
    Command,
    /// Command first, file as fallback.
    Chained,
}

/// Peer name source configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamesConfig {
    /// Source selection. Default: file.
    #[serde(default)]
    pub source: NameSourceKind,

    /// Names file; relative paths resolve against the executable's
    /// directory. Default: "peer_names.json".
    #[serde(default = "default_names_file")]
    pub file: PathBuf,

    /// Command printing the clients table.
    #[serde(default = "default_names_command")]
    pub command: Vec<String>,

    /// Maximum time the names command may run. Default: 10s.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_addr() -> String {
    ":9586".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_stale_after_cycles() -> u64 {
    10
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_dump_command() -> Vec<String> {
    ["docker", "exec", "amnezia-awg", "wg", "show", "all", "dump"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn default_names_file() -> PathBuf {
    PathBuf::from("peer_names.json")
}

fn default_names_command() -> Vec<String> {
    [
        "docker",
        "exec",
        "amnezia-awg",
        "cat",
        "/opt/amnezia/awg/clientsTable",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            listen_addr: default_listen_addr(),
            poll_interval: default_poll_interval(),
            dump: DumpConfig::default(),
            names: NamesConfig::default(),
            stale_after_cycles: default_stale_after_cycles(),
        }
    }
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            command: default_dump_command(),
            timeout: default_command_timeout(),
        }
    }
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self {
            source: NameSourceKind::default(),
            file: default_names_file(),
            command: default_names_command(),
            timeout: default_command_timeout(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        Self::from_yaml(&data).with_context(|| format!("loading config file {}", path.display()))
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data).context("parsing YAML")?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            bail!("listen_addr is required");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be positive");
        }

        if self.dump.command.is_empty() || self.dump.command[0].is_empty() {
            bail!("dump.command is required");
        }

        if self.dump.timeout.is_zero() {
            bail!("dump.timeout must be positive");
        }

        let needs_command = matches!(
            self.names.source,
            NameSourceKind::Command | NameSourceKind::Chained
        );
        let needs_file = matches!(
            self.names.source,
            NameSourceKind::File | NameSourceKind::Chained
        );

        if needs_command {
            if self.names.command.is_empty() || self.names.command[0].is_empty() {
                bail!("names.command is required for the command and chained sources");
            }
            if self.names.timeout.is_zero() {
                bail!("names.timeout must be positive");
            }
        }

        if needs_file && self.names.file.as_os_str().is_empty() {
            bail!("names.file is required for the file and chained sources");
        }

        Ok(())
    }
}

/// Expand ":port" to "0.0.0.0:port".
pub fn bind_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}
