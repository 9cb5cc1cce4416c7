//! Response head parsing.

use std::io::BufRead;

use http::{StatusCode, Version};

use crate::header::HeaderTable;
use crate::util::{read_line, MAX_RESPONSE_HEADERS};
use crate::Error;

/// A parsed `HTTP/<major>.<minor> SP code [SP reason]` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusLine {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
}

/// Parse a status line (without CRLF).
///
/// `HTTP/1.0` (minor version 0) yields [`Version::HTTP_10`], which makes
/// the session fall back to HTTP/1.0 semantics.
pub(crate) fn parse_status_line(line: &str) -> Result<StatusLine, Error> {
    let bad = || Error::BadStatusLine(line.to_string());

    // httparse needs a full head. With no room for headers, the status
    // line followed by an empty line is exactly what fits.
    let mut raw = Vec::with_capacity(line.len() + 4);
    raw.extend_from_slice(line.as_bytes());
    raw.extend_from_slice(b"\r\n\r\n");

    let mut res = httparse::Response::new(&mut []);
    match res.parse(&raw) {
        Ok(httparse::Status::Complete(_)) => {}
        _ => return Err(bad()),
    }

    let version = match res.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Err(bad()),
    };

    let status = res
        .code
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(bad)?;

    Ok(StatusLine {
        version,
        status,
        reason: res.reason.unwrap_or_default().to_string(),
    })
}

/// Read status line and header lines up to the blank line.
///
/// The status line is stored in the table's reserved slot.
pub(crate) fn read_response_head(src: &mut dyn BufRead) -> Result<(StatusLine, HeaderTable), Error> {
    let line = read_line(src)?.ok_or(Error::ConnectionClosed)?;
    let status = parse_status_line(&line)?;

    let mut headers = HeaderTable::new();
    headers.set_status_line(line);

    loop {
        let line = read_line(src)?.ok_or(Error::ConnectionClosed)?;
        if line.is_empty() {
            break;
        }
        if headers.len() == MAX_RESPONSE_HEADERS {
            return Err(Error::HttpParseFail("too many headers".into()));
        }
        headers.add_line(&line);
    }

    Ok((status, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_11() {
        let s = parse_status_line("HTTP/1.1 404 Not Found").unwrap();
        assert_eq!(s.version, Version::HTTP_11);
        assert_eq!(s.status, StatusCode::NOT_FOUND);
        assert_eq!(s.reason, "Not Found");
    }

    #[test]
    fn status_line_10_downgrades() {
        let s = parse_status_line("HTTP/1.0 200 OK").unwrap();
        assert_eq!(s.version, Version::HTTP_10);
    }

    #[test]
    fn status_line_bad() {
        for line in ["HTTP/1.1200 OK", "ICY 200 OK", "HTTP/1.1 abc", ""] {
            let err = parse_status_line(line).unwrap_err();
            assert!(matches!(err, Error::BadStatusLine(_)), "{:?}", line);
        }
    }

    #[test]
    fn head_with_headers() {
        let mut src: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nX-A: 1\r\n\r\nabc";
        let (status, headers) = read_response_head(&mut src).unwrap();
        assert_eq!(status.status, StatusCode::OK);
        assert_eq!(headers.status_line(), Some("HTTP/1.1 200 OK"));
        assert_eq!(headers.get("content-length"), Some("3"));
        assert_eq!(headers.len(), 2);
        assert_eq!(src, b"abc");
    }

    #[test]
    fn head_cut_short() {
        let mut src: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n";
        let err = read_response_head(&mut src).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn head_too_many_headers() {
        let mut res = String::from("HTTP/1.1 200 OK\r\n");
        for i in 0..1000 {
            res.push_str(&format!("X-Header-{}: value\r\n", i));
        }
        res.push_str("\r\n");

        let err = read_response_head(&mut res.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::HttpParseFail(_)));
    }
}
