//! One poll-parse-compute-publish iteration.
//!
//! [`Collector::collect`] is the pure core over dump text; [`Collector::run_cycle`]
//! wraps it with name loading, the dump invocation, and health metrics.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::dump::parse::parse_dump;
use crate::dump::source::DumpSource;
use crate::export::{ExporterMetrics, Projector};
use crate::names::{log_prefix, NameDirectory, NameSource};
use crate::rate::RateTracker;

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Interface named by the dump's header line.
    pub header_interface: Option<String>,
    /// Peers parsed and published.
    pub peers: usize,
    /// Peer lines rejected by the parser.
    pub parse_errors: usize,
    /// Peers dropped for being absent too long.
    pub expired: usize,
}

/// Owns the per-peer state carried between cycles.
pub struct Collector<D> {
    dump: D,
    names: NameSource,
    tracker: RateTracker,
    projector: Projector,
    metrics: Arc<ExporterMetrics>,
    stale_after_cycles: u64,
}

impl<D: DumpSource> Collector<D> {
    pub fn new(
        dump: D,
        names: NameSource,
        metrics: Arc<ExporterMetrics>,
        stale_after_cycles: u64,
    ) -> Self {
        Self {
            dump,
            names,
            tracker: RateTracker::new(),
            projector: Projector::new(Arc::clone(&metrics)),
            metrics,
            stale_after_cycles,
        }
    }

    /// Run one full cycle.
    ///
    /// A failed dump ends the cycle before any gauge is touched, leaving the
    /// previous values exposed. Samples are timestamped just before the dump
    /// is read.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary> {
        let start = Instant::now();

        let directory = self.load_names().await;

        // Rates span dump reads only, not name loading.
        let now = SystemTime::now();
        let text = match self.dump.fetch().await {
            Ok(text) => text,
            Err(e) => {
                self.metrics.cycles.with_label_values(&["error"]).inc();
                return Err(e).context("fetching peer dump");
            }
        };
        debug!(chars = text.len(), "received dump");

        let summary = self.collect(&text, &directory, now);

        self.metrics.cycles.with_label_values(&["success"]).inc();
        self.metrics
            .cycle_duration
            .observe(start.elapsed().as_secs_f64());

        Ok(summary)
    }

    /// Parse `text` and publish every valid peer as observed at `now`.
    pub fn collect(
        &mut self,
        text: &str,
        directory: &NameDirectory,
        now: SystemTime,
    ) -> CycleSummary {
        let dump = parse_dump(text);

        for err in &dump.errors {
            warn!(line = err.line, text = %err.text, error = %err.error, "error parsing dump line");
        }
        self.metrics
            .line_parse_errors
            .inc_by(dump.errors.len() as f64);

        self.tracker.begin_cycle();

        for record in &dump.peers {
            let display_name = directory.resolve(&record.identity);
            let rate = self.tracker.update(
                &record.key(),
                now,
                record.received_bytes,
                record.sent_bytes,
            );

            let (received_rate, sent_rate) = rate.rates();
            debug!(
                client_name = display_name,
                key = %log_prefix(&record.identity),
                interface = %record.interface,
                handshaked = record.has_handshaked(),
                rx = record.received_bytes,
                tx = record.sent_bytes,
                rx_rate = received_rate,
                tx_rate = sent_rate,
                "processing peer",
            );

            self.projector.project(record, display_name, rate);
        }

        let expired = self.tracker.expire(self.stale_after_cycles);
        for key in &expired {
            info!(peer = %key, "peer missing from dump, removing its series");
            self.projector.retire(key);
        }
        self.metrics.peers_expired.inc_by(expired.len() as f64);
        self.metrics.peers_tracked.set(self.tracker.len() as f64);

        info!(peers = dump.peers.len(), "processed peers");

        CycleSummary {
            header_interface: dump.header_interface,
            peers: dump.peers.len(),
            parse_errors: dump.errors.len(),
            expired: expired.len(),
        }
    }

    /// Load the name directory; failures yield an empty one.
    async fn load_names(&self) -> NameDirectory {
        match self.names.load().await {
            Ok(directory) => {
                self.metrics
                    .name_directory_entries
                    .set(directory.len() as f64);
                directory
            }
            Err(e) => {
                warn!(
                    source = self.names.name(),
                    error = %format!("{e:#}"),
                    "loading peer names failed, using default names",
                );
                self.metrics
                    .name_source_errors
                    .with_label_values(&[self.names.name()])
                    .inc();
                self.metrics.name_directory_entries.set(0.0);
                NameDirectory::new()
            }
        }
    }

    pub fn tracker(&self) -> &RateTracker {
        &self.tracker
    }
}
