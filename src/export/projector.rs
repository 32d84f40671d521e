use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::metrics::ExporterMetrics;
use crate::dump::{PeerKey, PeerRecord};
use crate::rate::RateResult;

/// Writes peer observations into the gauge families.
///
/// Remembers the display name each peer was last published under so that a
/// renamed or expired peer leaves no stale series behind.
pub struct Projector {
    metrics: Arc<ExporterMetrics>,
    published: HashMap<PeerKey, String>,
}

impl Projector {
    pub fn new(metrics: Arc<ExporterMetrics>) -> Self {
        Self {
            metrics,
            published: HashMap::new(),
        }
    }

    /// Set all five gauges for one peer. Overwrites, never accumulates.
    pub fn project(&mut self, record: &PeerRecord, display_name: &str, rate: RateResult) {
        let key = record.key();

        if let Some(previous) = self.published.get(&key) {
            if previous != display_name {
                debug!(
                    peer = %key,
                    from = %previous,
                    to = display_name,
                    "display name changed, removing old series",
                );
                self.remove_series(&key.interface, &key.identity, previous);
            }
        }

        let labels = [
            record.interface.as_str(),
            record.identity.as_str(),
            display_name,
        ];
        let (received_rate, sent_rate) = rate.rates();

        let m = &self.metrics;
        m.received_bytes
            .with_label_values(&labels)
            .set(record.received_bytes as f64);
        m.sent_bytes
            .with_label_values(&labels)
            .set(record.sent_bytes as f64);
        m.received_rate
            .with_label_values(&labels)
            .set(received_rate);
        m.sent_rate.with_label_values(&labels).set(sent_rate);
        m.latest_handshake
            .with_label_values(&labels)
            .set(record.last_handshake_epoch as f64);

        self.published.insert(key, display_name.to_string());
    }

    /// Remove every series published for `key`.
    pub fn retire(&mut self, key: &PeerKey) {
        if let Some(name) = self.published.remove(key) {
            self.remove_series(&key.interface, &key.identity, &name);
        }
    }

    /// Number of peers with published series.
    #[cfg(test)]
    pub fn published_len(&self) -> usize {
        self.published.len()
    }

    fn remove_series(&self, interface: &str, identity: &str, name: &str) {
        let labels = [interface, identity, name];
        for family in self.metrics.peer_families() {
            if let Err(e) = family.remove_label_values(&labels) {
                warn!(error = %e, interface, "removing peer series");
            }
        }
    }
}
