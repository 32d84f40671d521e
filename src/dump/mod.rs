//! Peer state as reported by `wg show all dump`.
//!
//! The dump is a tab-delimited table: one interface line followed by one line
//! per peer. [`parse::parse_dump`] turns it into [`PeerRecord`]s and
//! [`source`] obtains the raw text from the tunnel daemon.

pub mod parse;
pub mod source;

use std::fmt;

use parse::LineError;

/// Handshake epoch value meaning "never handshaked".
pub const HANDSHAKE_NEVER: u64 = 0;

/// One peer line of a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Tunnel interface owning this peer (e.g. "awg0").
    pub interface: String,
    /// Peer public key.
    pub identity: String,
    /// Unix seconds of the last handshake, or [`HANDSHAKE_NEVER`].
    pub last_handshake_epoch: u64,
    /// Cumulative bytes received from the peer.
    pub received_bytes: u64,
    /// Cumulative bytes sent to the peer.
    pub sent_bytes: u64,
}

impl PeerRecord {
    /// Returns the tracker key for this peer.
    pub fn key(&self) -> PeerKey {
        PeerKey {
            interface: self.interface.clone(),
            identity: self.identity.clone(),
        }
    }

    /// Whether the peer has ever completed a handshake.
    pub fn has_handshaked(&self) -> bool {
        self.last_handshake_epoch != HANDSHAKE_NEVER
    }
}

/// Identifies a peer across cycles: `(interface, identity)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerKey {
    pub interface: String,
    pub identity: String,
}

impl PeerKey {
    pub fn new(interface: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            identity: identity.into(),
        }
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.interface, self.identity)
    }
}

/// Result of parsing one dump.
#[derive(Debug, Default)]
pub struct ParsedDump {
    /// Name taken from the interface header line, if one was seen.
    pub header_interface: Option<String>,
    /// Valid peer lines, in input order.
    pub peers: Vec<PeerRecord>,
    /// Lines that looked like peers but failed to parse.
    pub errors: Vec<LineError>,
}
