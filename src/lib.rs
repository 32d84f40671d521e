//! Prometheus exporter for AmneziaWG / WireGuard peer statistics.
//!
//! Each cycle runs `wg show all dump`, parses it, derives per-peer transfer
//! rates, and publishes traffic and handshake gauges labelled by interface,
//! public key, and a human-readable client name.

pub mod agent;
pub mod collector;
pub mod command;
pub mod config;
pub mod dump;
pub mod export;
pub mod names;
pub mod rate;
