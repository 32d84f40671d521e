//! Public key to display name resolution.
//!
//! A [`NameDirectory`] is loaded once per cycle from a [`NameSource`]. Keys
//! missing from the directory fall back to a shortened key.

mod source;

pub use source::{ChainedSource, CommandSource, FileSource, NameSource};

use std::collections::HashMap;

/// Number of leading key characters used when a peer has no configured name.
pub const SHORT_NAME_LEN: usize = 8;

/// Mapping from peer public key to display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameDirectory {
    names: HashMap<String, String>,
}

impl NameDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: impl Into<String>, name: impl Into<String>) {
        self.names.insert(identity.into(), name.into());
    }

    pub fn get(&self, identity: &str) -> Option<&str> {
        self.names.get(identity).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Display name for `identity`; see [`resolve`].
    pub fn resolve<'a>(&'a self, identity: &'a str) -> &'a str {
        resolve(identity, self)
    }
}

impl From<HashMap<String, String>> for NameDirectory {
    fn from(names: HashMap<String, String>) -> Self {
        Self { names }
    }
}

impl FromIterator<(String, String)> for NameDirectory {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

/// Resolve a display name, falling back to the first [`SHORT_NAME_LEN`]
/// characters of the key (or the whole key when it is that short).
pub fn resolve<'a>(identity: &'a str, directory: &'a NameDirectory) -> &'a str {
    if let Some(name) = directory.get(identity) {
        return name;
    }
    short_name(identity)
}

/// Leading [`SHORT_NAME_LEN`] characters of `identity`.
pub fn short_name(identity: &str) -> &str {
    match identity.char_indices().nth(SHORT_NAME_LEN) {
        Some((end, _)) => &identity[..end],
        None => identity,
    }
}

/// Key prefix used in log lines so full keys stay out of the logs.
pub(crate) fn log_prefix(identity: &str) -> &str {
    match identity.char_indices().nth(16) {
        Some((end, _)) => &identity[..end],
        None => identity,
    }
}
