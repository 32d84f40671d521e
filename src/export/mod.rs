//! Prometheus exposition of peer state.

pub mod metrics;
pub mod projector;

pub use metrics::{ExporterMetrics, PEER_LABELS};
pub use projector::Projector;
