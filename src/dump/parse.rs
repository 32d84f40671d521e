//! Parsing of the tab-delimited peer dump.
//!
//! Line classification follows the shape of `wg show all dump` output for
//! AmneziaWG: the interface line carries more than eight fields (the
//! obfuscation parameters push it past the peer width), peer lines carry at
//! least eight. Only the first wide line of a dump is treated as the
//! interface header; later wide lines are parsed as peers.

use std::num::ParseIntError;

use thiserror::Error;

use super::{ParsedDump, PeerRecord, HANDSHAKE_NEVER};

/// Field separator within a dump line.
const FIELD_SEPARATOR: char = '\t';

/// Minimum number of fields for a peer line.
pub const PEER_MIN_FIELDS: usize = 8;

/// A line with more fields than this may be the interface header.
pub const HEADER_MIN_FIELDS_EXCLUSIVE: usize = 8;

const FIELD_INTERFACE: usize = 0;
const FIELD_IDENTITY: usize = 1;
const FIELD_LATEST_HANDSHAKE: usize = 5;
const FIELD_RECEIVED_BYTES: usize = 6;
const FIELD_SENT_BYTES: usize = 7;

/// Errors for a single peer line.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing field {index} ({name})")]
    MissingField { index: usize, name: &'static str },

    #[error("invalid {name} value {value:?}: {source}")]
    InvalidInteger {
        name: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// A rejected line together with its position in the dump.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("line {line}: {error}")]
pub struct LineError {
    /// 1-based line number within the dump.
    pub line: usize,
    /// The raw line text.
    pub text: String,
    #[source]
    pub error: ParseError,
}

/// Parse a full dump.
///
/// Never fails as a whole: malformed peer lines are collected in
/// [`ParsedDump::errors`] and parsing continues with the next line.
pub fn parse_dump(text: &str) -> ParsedDump {
    let mut dump = ParsedDump::default();

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();

        if fields.len() > HEADER_MIN_FIELDS_EXCLUSIVE && dump.header_interface.is_none() {
            dump.header_interface = Some(fields[FIELD_INTERFACE].to_string());
            continue;
        }

        if fields.len() < PEER_MIN_FIELDS {
            continue;
        }

        match parse_peer_fields(&fields) {
            Ok(record) => dump.peers.push(record),
            Err(error) => dump.errors.push(LineError {
                line: idx + 1,
                text: line.to_string(),
                error,
            }),
        }
    }

    dump
}

/// Parse the positional fields of one peer line.
pub fn parse_peer_fields(fields: &[&str]) -> Result<PeerRecord, ParseError> {
    let interface = field(fields, FIELD_INTERFACE, "interface")?;
    let identity = field(fields, FIELD_IDENTITY, "public key")?;
    let latest_handshake = field(fields, FIELD_LATEST_HANDSHAKE, "latest handshake")?;
    let received = field(fields, FIELD_RECEIVED_BYTES, "received bytes")?;
    let sent = field(fields, FIELD_SENT_BYTES, "sent bytes")?;

    Ok(PeerRecord {
        interface: interface.to_string(),
        identity: identity.to_string(),
        last_handshake_epoch: parse_handshake(latest_handshake)?,
        received_bytes: parse_u64(received, "received bytes")?,
        sent_bytes: parse_u64(sent, "sent bytes")?,
    })
}

fn field<'a>(fields: &[&'a str], index: usize, name: &'static str) -> Result<&'a str, ParseError> {
    fields
        .get(index)
        .copied()
        .ok_or(ParseError::MissingField { index, name })
}

/// The literal "0" is the daemon's "never" marker.
fn parse_handshake(raw: &str) -> Result<u64, ParseError> {
    if raw == "0" {
        return Ok(HANDSHAKE_NEVER);
    }
    parse_u64(raw, "latest handshake")
}

fn parse_u64(raw: &str, name: &'static str) -> Result<u64, ParseError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|source| ParseError::InvalidInteger {
            name,
            value: raw.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "awg0\tprivkey\tpubkey\t51820\toff\t4\t40\t70\t0";

    fn peer_line(key: &str, hs: &str, rx: &str, tx: &str) -> String {
        format!("awg0\t{key}\t(none)\t1.2.3.4:51820\t10.8.1.2/32\t{hs}\t{rx}\t{tx}\toff")
    }

    #[test]
    fn test_parse_header_and_peers() {
        let text = format!(
            "{HEADER}\n{}\n{}\n",
            peer_line("KEY1", "1700000000", "1000", "2000"),
            peer_line("KEY2", "0", "0", "0"),
        );

        let dump = parse_dump(&text);
        assert_eq!(dump.header_interface.as_deref(), Some("awg0"));
        assert!(dump.errors.is_empty());
        assert_eq!(dump.peers.len(), 2);

        assert_eq!(
            dump.peers[0],
            PeerRecord {
                interface: "awg0".to_string(),
                identity: "KEY1".to_string(),
                last_handshake_epoch: 1_700_000_000,
                received_bytes: 1000,
                sent_bytes: 2000,
            }
        );
        assert_eq!(dump.peers[1].identity, "KEY2");
        assert!(!dump.peers[1].has_handshaked());
    }

    #[test]
    fn test_parse_preserves_order() {
        let text = format!(
            "{HEADER}\n{}\n{}\n{}",
            peer_line("C", "1", "1", "1"),
            peer_line("A", "1", "1", "1"),
            peer_line("B", "1", "1", "1"),
        );

        let ids: Vec<String> = parse_dump(&text)
            .peers
            .into_iter()
            .map(|p| p.identity)
            .collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_parse_skips_blank_and_short_lines() {
        let text = format!(
            "{HEADER}\n\n   \nawg0\tshort\tline\n{}\n",
            peer_line("KEY1", "5", "6", "7"),
        );

        let dump = parse_dump(&text);
        assert_eq!(dump.peers.len(), 1);
        assert!(dump.errors.is_empty());
    }

    #[test]
    fn test_parse_exactly_eight_fields_is_peer() {
        let text = format!("{HEADER}\nawg0\tKEY\tpsk\tendpoint\tips\t12\t34\t56");
        let dump = parse_dump(&text);
        assert_eq!(dump.peers.len(), 1);
        assert_eq!(dump.peers[0].last_handshake_epoch, 12);
        assert_eq!(dump.peers[0].received_bytes, 34);
        assert_eq!(dump.peers[0].sent_bytes, 56);
    }

    #[test]
    fn test_parse_without_header_takes_first_wide_line_as_header() {
        // A plain WireGuard dump has a 5-field interface line, so the first
        // 9-field peer line is consumed as the header.
        let text = format!(
            "wg0\tpriv\tpub\t51820\toff\n{}\n{}",
            peer_line("FIRST", "1", "1", "1"),
            peer_line("SECOND", "1", "1", "1"),
        );

        let dump = parse_dump(&text);
        assert_eq!(dump.header_interface.as_deref(), Some("awg0"));
        assert_eq!(dump.peers.len(), 1);
        assert_eq!(dump.peers[0].identity, "SECOND");
    }

    #[test]
    fn test_parse_second_wide_line_is_peer() {
        let text = format!(
            "{HEADER}\n{}",
            "awg1\tprivkey\tpubkey\t51821\toff\t4\t40\t70\t0"
        );
        let dump = parse_dump(&text);
        assert_eq!(dump.peers.len(), 1);
        assert_eq!(dump.peers[0].interface, "awg1");
        assert_eq!(dump.peers[0].received_bytes, 40);
    }

    #[test]
    fn test_parse_invalid_integer_is_line_error() {
        let text = format!(
            "{HEADER}\n{}\n{}",
            peer_line("BAD", "1700000000", "lots", "2000"),
            peer_line("GOOD", "1700000000", "1", "2"),
        );

        let dump = parse_dump(&text);
        assert_eq!(dump.peers.len(), 1);
        assert_eq!(dump.peers[0].identity, "GOOD");
        assert_eq!(dump.errors.len(), 1);

        let err = &dump.errors[0];
        assert_eq!(err.line, 2);
        assert!(matches!(
            err.error,
            ParseError::InvalidInteger {
                name: "received bytes",
                ..
            }
        ));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_negative_counter_rejected() {
        let text = format!("{HEADER}\n{}", peer_line("NEG", "1", "-5", "2"));
        let dump = parse_dump(&text);
        assert!(dump.peers.is_empty());
        assert_eq!(dump.errors.len(), 1);
    }

    #[test]
    fn test_handshake_zero_sentinel() {
        let text = format!("{HEADER}\n{}", peer_line("K", "0", "99", "98"));
        let dump = parse_dump(&text);
        assert_eq!(dump.peers[0].last_handshake_epoch, HANDSHAKE_NEVER);
        assert_eq!(dump.peers[0].received_bytes, 99);
    }

    #[test]
    fn test_handshake_invalid_is_error() {
        let text = format!("{HEADER}\n{}", peer_line("K", "yesterday", "1", "1"));
        let dump = parse_dump(&text);
        assert!(dump.peers.is_empty());
        assert!(matches!(
            dump.errors[0].error,
            ParseError::InvalidInteger {
                name: "latest handshake",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_handles_crlf() {
        let text = format!("{HEADER}\r\n{}\r\n", peer_line("K", "7", "8", "9"));
        let dump = parse_dump(&text);
        assert_eq!(dump.peers.len(), 1);
        assert_eq!(dump.peers[0].sent_bytes, 9);
    }

    #[test]
    fn test_parse_peer_fields_missing_field() {
        let err = parse_peer_fields(&["awg0", "key"]).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingField {
                index: 5,
                name: "latest handshake"
            }
        );
    }

    #[test]
    fn test_parse_empty_input() {
        let dump = parse_dump("");
        assert!(dump.header_interface.is_none());
        assert!(dump.peers.is_empty());
        assert!(dump.errors.is_empty());
    }
}
