//! Byte-rate derivation from cumulative peer counters.
//!
//! The tracker keeps exactly one prior sample per peer. Each update computes
//! the rate against that sample and then replaces it.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::dump::PeerKey;

/// Outcome of a tracker update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateResult {
    /// No usable prior sample (first observation, or the clock did not advance).
    NoPriorSample,
    /// Bytes per second since the previous sample.
    Rate { received: f64, sent: f64 },
}

impl RateResult {
    /// `(received, sent)` rates; zero when no rate is available.
    pub fn rates(&self) -> (f64, f64) {
        match *self {
            Self::NoPriorSample => (0.0, 0.0),
            Self::Rate { received, sent } => (received, sent),
        }
    }
}

/// Most recent sample for one peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub observed_at: SystemTime,
    pub received_bytes: u64,
    pub sent_bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    sample: Sample,
    last_seen_cycle: u64,
}

/// Per-peer rate state, owned by the collector.
#[derive(Debug, Default)]
pub struct RateTracker {
    entries: HashMap<PeerKey, Entry>,
    cycle: u64,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of a new collection cycle.
    pub fn begin_cycle(&mut self) -> u64 {
        self.cycle += 1;
        self.cycle
    }

    /// Record a sample for `key` and return the rate against the previous one.
    ///
    /// The stored sample is always replaced, whichever result is returned.
    pub fn update(
        &mut self,
        key: &PeerKey,
        now: SystemTime,
        received_bytes: u64,
        sent_bytes: u64,
    ) -> RateResult {
        let current = Sample {
            observed_at: now,
            received_bytes,
            sent_bytes,
        };
        let entry = Entry {
            sample: current,
            last_seen_cycle: self.cycle,
        };

        let prior = match self.entries.get_mut(key) {
            Some(slot) => std::mem::replace(slot, entry).sample,
            None => {
                self.entries.insert(key.clone(), entry);
                return RateResult::NoPriorSample;
            }
        };

        let elapsed = match now.duration_since(prior.observed_at) {
            Ok(d) if d > Duration::ZERO => d,
            _ => {
                debug!(peer = %key, "clock did not advance since previous sample");
                return RateResult::NoPriorSample;
            }
        };

        let secs = elapsed.as_secs_f64();
        RateResult::Rate {
            received: per_second(prior.received_bytes, received_bytes, secs),
            sent: per_second(prior.sent_bytes, sent_bytes, secs),
        }
    }

    /// Previous sample for `key`, if any.
    #[cfg(test)]
    pub fn sample(&self, key: &PeerKey) -> Option<Sample> {
        self.entries.get(key).map(|e| e.sample)
    }

    /// Drop peers that have been absent for `max_missed` consecutive cycles.
    ///
    /// `max_missed == 0` disables expiry. Returns the removed keys.
    pub fn expire(&mut self, max_missed: u64) -> Vec<PeerKey> {
        if max_missed == 0 {
            return Vec::new();
        }

        let cycle = self.cycle;
        let mut expired = Vec::new();
        self.entries.retain(|key, entry| {
            let keep = cycle.saturating_sub(entry.last_seen_cycle) < max_missed;
            if !keep {
                expired.push(key.clone());
            }
            keep
        });
        expired.sort();
        expired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counter delta per second, clamped at zero so counter resets read as idle.
fn per_second(prior: u64, current: u64, secs: f64) -> f64 {
    current
        .checked_sub(prior)
        .map_or(0.0, |delta| delta as f64 / secs)
}
