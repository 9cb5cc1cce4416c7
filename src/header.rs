//! Ordered, duplicate permitting header storage.
//!
//! Used for both request and response headers. Lookups are case-insensitive
//! and return the most recently added match. Keys are stored verbatim, which
//! includes the empty key used for malformed lines without a colon.

use std::fmt;
use std::io::{self, Write};

/// Ordered list of `(key, value)` pairs plus a reserved status line slot.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderTable {
    status_line: Option<String>,
    entries: Vec<(String, String)>,
}

impl HeaderTable {
    /// Empty table without status line.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table seeded from a default header prototype.
    pub fn with_defaults(defaults: &DefaultHeaders) -> Self {
        Self {
            status_line: None,
            entries: defaults.0.entries.clone(),
        }
    }

    /// The reserved first line. For a response this is `HTTP/1.1 200 OK`.
    pub fn status_line(&self) -> Option<&str> {
        self.status_line.as_deref()
    }

    /// Replace the reserved first line.
    pub fn set_status_line(&mut self, line: impl Into<String>) {
        self.status_line = Some(line.into());
    }

    /// Replace every entry for `key` with a single new one.
    ///
    /// The new entry goes last, as if freshly added.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.remove_all(&key);
        self.entries.push((key, value.into()));
    }

    /// Append an entry, keeping any existing ones for the same key.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Append only if no entry with `key` exists. Returns whether it was added.
    pub fn add_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains(&key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    /// The last added value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key` in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Delete every entry for `key`. Returns how many were removed.
    pub fn remove_all(&mut self, key: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        before - self.entries.len()
    }

    /// Whether any entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    /// Tell if any value of `key`, read as a comma separated token list,
    /// contains `token` (case-insensitive).
    ///
    /// `Connection: keep-alive, close` has `close`.
    pub fn has_token(&self, key: &str, token: &str) -> bool {
        self.get_all(key)
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// Number of entries, not counting the status line.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Tell if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key at position `index`.
    pub fn key_at(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(k, _)| k.as_str())
    }

    /// Value at position `index`.
    pub fn value_at(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(_, v)| v.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Add a raw header line as received on the wire (without CRLF).
    ///
    /// A line without colon is kept with an empty key.
    pub(crate) fn add_line(&mut self, line: &str) {
        match line.find(':') {
            Some(idx) => {
                let key = line[..idx].trim();
                let value = line[idx + 1..].trim();
                self.add(key, value);
            }
            None => self.add("", line.trim()),
        }
    }

    /// Serialize status line, headers and the terminating blank line.
    ///
    /// Entries with an empty key are not sent.
    pub(crate) fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        if let Some(line) = &self.status_line {
            write!(w, "{}\r\n", line)?;
        }
        for (k, v) in &self.entries {
            if k.is_empty() {
                continue;
            }
            write!(w, "{}: {}\r\n", k, v)?;
        }
        write!(w, "\r\n")
    }
}

impl fmt::Debug for HeaderTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderTable")
            .field("status_line", &self.status_line)
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Immutable prototype of headers every request starts out with.
///
/// Set once in [`Config`](crate::config::Config) and copied into each new
/// session's request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultHeaders(HeaderTable);

impl DefaultHeaders {
    /// No default headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a default header.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.add(key, value);
        self
    }

    /// Inspect the defaults.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter()
    }
}
