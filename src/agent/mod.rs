use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::collector::Collector;
use crate::config::Config;
use crate::dump::source::{CommandDumpSource, DumpSource};
use crate::export::ExporterMetrics;
use crate::names::NameSource;

/// Agent owns the metrics server and the collection loop.
pub struct Agent {
    metrics: Arc<ExporterMetrics>,
    poll_interval: Duration,
    collector: Option<Collector<CommandDumpSource>>,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Agent {
    /// Creates a new Agent with metrics registered and sources built from `cfg`.
    pub fn new(cfg: Config) -> Result<Self> {
        let metrics =
            Arc::new(ExporterMetrics::new(&cfg.listen_addr).context("creating exporter metrics")?);

        let names = NameSource::from_config(&cfg.names);
        info!(source = names.name(), "configured name source");

        let collector = Collector::new(
            CommandDumpSource::new(&cfg.dump),
            names,
            Arc::clone(&metrics),
            cfg.stale_after_cycles,
        );

        Ok(Self {
            metrics,
            poll_interval: cfg.poll_interval,
            collector: Some(collector),
            task: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Start the metrics server, then the collection loop.
    pub async fn start(&mut self) -> Result<()> {
        if self.collector.is_none() {
            bail!("agent already started");
        }

        let addr = self
            .metrics
            .start()
            .await
            .context("starting metrics server")?;
        info!(addr = %addr, "serving metrics");

        let collector = self
            .collector
            .take()
            .context("collector missing")?;

        self.task = Some(spawn_collection_loop(
            collector,
            self.poll_interval,
            self.cancel.clone(),
        ));

        info!(
            poll_interval = ?self.poll_interval,
            "agent fully started",
        );

        Ok(())
    }

    /// Stop the collection loop and the metrics server.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "collection loop ended abnormally");
            }
        }

        self.metrics.stop().await?;

        Ok(())
    }
}

/// Spawn the collection loop.
///
/// The poll interval is a pause after each cycle completes, so cycles never
/// overlap. Cancellation is observed between cycles and during the pause.
fn spawn_collection_loop<D>(
    mut collector: Collector<D>,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    D: DumpSource + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                result = collector.run_cycle() => {
                    if let Err(e) = result {
                        error!(error = %format!("{e:#}"), "collection cycle failed");
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    })
}
