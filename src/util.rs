use std::io::{BufRead, Read};

use crate::Error;

/// Longest header or status line we accept.
pub(crate) const MAX_LINE_LEN: usize = 16 * 1024;

/// Max number of header lines in one response head.
pub(crate) const MAX_RESPONSE_HEADERS: usize = 128;

/// Dump wire bytes at trace level, one log row per line.
pub(crate) fn log_data(data: &[u8]) {
    if !log_enabled!(log::Level::Trace) {
        return;
    }

    for line in data.split(|c| *c == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        trace!("{}", String::from_utf8_lossy(line));
    }
}

/// Read one CRLF (or bare LF) terminated line, without the terminator.
///
/// Returns `None` on a clean EOF before any byte was read.
pub(crate) fn read_line(r: &mut dyn BufRead) -> Result<Option<String>, Error> {
    let mut buf = Vec::new();
    let n = r
        .take(MAX_LINE_LEN as u64 + 2)
        .read_until(b'\n', &mut buf)
        .map_err(Error::from_io)?;

    if n == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') {
        if n > MAX_LINE_LEN {
            return Err(Error::BadHeader("line too long".into()));
        }
        // Peer closed mid line.
        return Err(Error::ConnectionClosed);
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    // Header values are latin-1 in the wild, keep them lossless as chars.
    let line = match String::from_utf8(buf) {
        Ok(v) => v,
        Err(e) => e.into_bytes().iter().map(|b| *b as char).collect(),
    };

    Ok(Some(line))
}
