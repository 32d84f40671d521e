use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::command::{self, CommandError};
use crate::config::DumpConfig;

/// Failure to obtain a dump. Always scoped to a single cycle.
#[derive(Error, Debug)]
pub enum DumpError {
    #[error("dump command failed: {0}")]
    Command(#[from] CommandError),
}

/// Supplier of raw dump text.
pub trait DumpSource: Send + Sync {
    /// Fetch the current dump.
    fn fetch(&self) -> impl Future<Output = Result<String, DumpError>> + Send;
}

/// Runs the configured command (by default `docker exec amnezia-awg wg show all dump`).
#[derive(Debug, Clone)]
pub struct CommandDumpSource {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandDumpSource {
    pub fn new(cfg: &DumpConfig) -> Self {
        Self {
            argv: cfg.command.clone(),
            timeout: cfg.timeout,
        }
    }
}

impl DumpSource for CommandDumpSource {
    async fn fetch(&self) -> Result<String, DumpError> {
        Ok(command::run(&self.argv, self.timeout).await?)
    }
}
