//! Request and response body framing.
//!
//! A [`BodyWriter`] is chosen once per request before any byte is written, a
//! [`BodyReader`] once per response after the head is parsed. Neither
//! changes strategy afterwards.

use std::io::{BufRead, Write};

use http::{header, Method, StatusCode};

use crate::ext::MethodExt;
use crate::header::HeaderTable;
use crate::Error;

mod chunked;

pub use chunked::{ChunkedDecoder, ChunkedEncoder, DEFAULT_CHUNK_SIZE};

/// How a body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Exactly this many bytes, announced by `content-length`.
    FixedLength(u64),
    /// `transfer-encoding: chunked`.
    Chunked,
    /// Read until the peer closes the connection.
    UnknownLength,
}

/// Parameters for choosing the outgoing body strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyOptions {
    /// Length configured through fixed-length streaming mode.
    pub fixed_length: Option<u64>,
    /// Chunk size configured through chunked streaming mode.
    pub chunk_size: Option<usize>,
    /// The caller set `transfer-encoding: chunked` on the request.
    pub chunked_requested: bool,
    /// The caller set a valid `content-length` on the request.
    pub content_length: Option<u64>,
    /// The request is sent as HTTP/1.0, which has no chunked encoding.
    pub http10: bool,
}

/// Outgoing body strategy.
#[derive(Debug)]
pub enum BodyWriter {
    /// Stream exactly `length` bytes straight to the connection.
    FixedLength {
        /// Announced length.
        length: u64,
        /// Bytes written so far.
        written: u64,
    },
    /// Stream chunks straight to the connection.
    Chunked(ChunkedEncoder),
    /// Buffer everything so it can be sent, and re-sent, with a known length.
    Retryable(RetryableBuffer),
}

impl BodyWriter {
    /// Pick the strategy for a request.
    pub fn select(opts: &BodyOptions) -> BodyWriter {
        if let Some(length) = opts.fixed_length {
            return BodyWriter::FixedLength { length, written: 0 };
        }

        let positive_chunk = opts.chunk_size.filter(|s| *s > 0);

        if !opts.http10 && (opts.chunked_requested || positive_chunk.is_some()) {
            let size = positive_chunk.unwrap_or(DEFAULT_CHUNK_SIZE);
            return BodyWriter::Chunked(ChunkedEncoder::new(size));
        }

        BodyWriter::Retryable(RetryableBuffer::new(opts.content_length))
    }

    /// Tell if bytes go straight to the connection, which means the body
    /// cannot be replayed.
    pub fn is_streaming(&self) -> bool {
        !matches!(self, BodyWriter::Retryable(_))
    }

    /// Tell if the body is complete.
    pub fn is_ended(&self) -> bool {
        match self {
            BodyWriter::FixedLength { length, written } => written == length,
            BodyWriter::Chunked(c) => c.is_ended(),
            BodyWriter::Retryable(r) => r.closed,
        }
    }

    /// The header announcing this body's framing, named as it goes on the wire.
    ///
    /// For a retryable body this is only accurate once it is closed.
    pub fn framing_header(&self) -> (&'static str, String) {
        match self {
            BodyWriter::FixedLength { length, .. } => ("Content-Length", length.to_string()),
            BodyWriter::Chunked(_) => ("Transfer-Encoding", "chunked".into()),
            BodyWriter::Retryable(r) => ("Content-Length", r.data.len().to_string()),
        }
    }

    /// Write body bytes.
    ///
    /// Streaming strategies write to `out`, the retryable one keeps the bytes
    /// and ignores `out`.
    pub fn write(&mut self, input: &[u8], out: &mut dyn Write) -> Result<usize, Error> {
        match self {
            BodyWriter::FixedLength { length, written } => {
                if input.len() as u64 > *length - *written {
                    return Err(Error::BodyLargerThanContentLength);
                }
                out.write_all(input)?;
                *written += input.len() as u64;
                Ok(input.len())
            }
            BodyWriter::Chunked(c) => c.write(input, out),
            BodyWriter::Retryable(r) => r.write(input),
        }
    }

    /// Push through anything buffered in a streaming strategy.
    pub fn flush(&mut self, out: &mut dyn Write) -> Result<(), Error> {
        match self {
            BodyWriter::FixedLength { .. } => Ok(out.flush()?),
            BodyWriter::Chunked(c) => c.flush(out),
            BodyWriter::Retryable(_) => Ok(()),
        }
    }

    /// Mark the body complete.
    ///
    /// A fixed-length body that fell short is an error, a chunked body
    /// writes its terminator.
    pub fn finish(&mut self, out: &mut dyn Write) -> Result<(), Error> {
        match self {
            BodyWriter::FixedLength { length, written } => {
                if written < length {
                    return Err(Error::BodyShorterThanContentLength {
                        expected: *length,
                        actual: *written,
                    });
                }
                Ok(out.flush()?)
            }
            BodyWriter::Chunked(c) => c.finish(out),
            BodyWriter::Retryable(r) => {
                r.closed = true;
                Ok(())
            }
        }
    }
}

/// In-memory request body, kept for re-sending on retry.
#[derive(Debug, Default)]
pub struct RetryableBuffer {
    data: Vec<u8>,
    limit: Option<u64>,
    closed: bool,
}

impl RetryableBuffer {
    /// Buffer bounded by `limit`, or unbounded.
    pub fn new(limit: Option<u64>) -> Self {
        RetryableBuffer {
            data: Vec::with_capacity(limit.unwrap_or(0).min(64 * 1024) as usize),
            limit,
            closed: false,
        }
    }

    fn write(&mut self, input: &[u8]) -> Result<usize, Error> {
        if self.closed {
            return Err(Error::BodyContentAfterFinish);
        }
        if let Some(limit) = self.limit {
            if (self.data.len() + input.len()) as u64 > limit {
                return Err(Error::BodyLargerThanContentLength);
            }
        }
        self.data.extend_from_slice(input);
        Ok(input.len())
    }

    /// The buffered bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Send the buffered bytes over the now connected socket.
    pub fn transmit(&self, out: &mut dyn Write) -> Result<(), Error> {
        if let Some(limit) = self.limit {
            if (self.data.len() as u64) < limit {
                return Err(Error::BodyShorterThanContentLength {
                    expected: limit,
                    actual: self.data.len() as u64,
                });
            }
        }
        out.write_all(&self.data)?;
        out.flush()?;
        Ok(())
    }
}

/// Tell if a response carries a body.
///
/// `HEAD` and `CONNECT` never do. 1xx, 204 and 304 do not, unless the
/// `content-length` or `transfer-encoding` headers say otherwise, in which
/// case the headers win.
pub fn has_body(method: &Method, status: StatusCode, headers: &HeaderTable) -> bool {
    if method.has_no_response_body() {
        return false;
    }

    let code = status.as_u16();
    let bodiless_status = (100..200).contains(&code)
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;

    if !bodiless_status {
        return true;
    }

    content_length(headers).is_some() || is_chunked(headers)
}

pub(crate) fn content_length(headers: &HeaderTable) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH.as_str())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

pub(crate) fn is_chunked(headers: &HeaderTable) -> bool {
    headers.has_token(header::TRANSFER_ENCODING.as_str(), "chunked")
}

#[derive(Debug)]
enum ReaderKind {
    FixedLength { length: u64, left: u64 },
    Chunked(ChunkedDecoder),
    UnknownLength { ended: bool },
}

/// Incoming body strategy.
#[derive(Debug)]
pub struct BodyReader {
    kind: ReaderKind,
}

impl BodyReader {
    /// Pick the strategy for a response head.
    pub fn for_response(method: &Method, status: StatusCode, headers: &HeaderTable) -> BodyReader {
        if !has_body(method, status, headers) {
            return BodyReader::fixed(0);
        }

        if is_chunked(headers) {
            return BodyReader {
                kind: ReaderKind::Chunked(ChunkedDecoder::new()),
            };
        }

        if let Some(length) = content_length(headers) {
            return BodyReader::fixed(length);
        }

        BodyReader {
            kind: ReaderKind::UnknownLength { ended: false },
        }
    }

    /// A reader for exactly `length` bytes.
    pub fn fixed(length: u64) -> BodyReader {
        BodyReader {
            kind: ReaderKind::FixedLength {
                length,
                left: length,
            },
        }
    }

    /// The framing of this body.
    pub fn mode(&self) -> BodyMode {
        match &self.kind {
            ReaderKind::FixedLength { length, .. } => BodyMode::FixedLength(*length),
            ReaderKind::Chunked(_) => BodyMode::Chunked,
            ReaderKind::UnknownLength { .. } => BodyMode::UnknownLength,
        }
    }

    /// Tell if the body was read to its end.
    pub fn is_ended(&self) -> bool {
        match &self.kind {
            ReaderKind::FixedLength { left, .. } => *left == 0,
            ReaderKind::Chunked(c) => c.is_ended(),
            ReaderKind::UnknownLength { ended } => *ended,
        }
    }

    /// Tell if the end of body is the peer closing the socket.
    pub fn is_close_delimited(&self) -> bool {
        matches!(self.kind, ReaderKind::UnknownLength { .. })
    }

    /// Read body bytes from `src` into `buf`. `Ok(0)` at end of body.
    pub fn read(&mut self, src: &mut dyn BufRead, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        match &mut self.kind {
            ReaderKind::FixedLength { length, left } => {
                if *left == 0 {
                    return Ok(0);
                }
                let max = (buf.len() as u64).min(*left) as usize;
                let n = src.read(&mut buf[..max])?;
                if n == 0 {
                    debug!(
                        "Body ended after {} of {} bytes",
                        *length - *left,
                        length
                    );
                    return Err(Error::ConnectionClosed);
                }
                *left -= n as u64;
                Ok(n)
            }
            ReaderKind::Chunked(c) => c.read(src, buf),
            ReaderKind::UnknownLength { ended } => {
                if *ended {
                    return Ok(0);
                }
                let n = src.read(buf)?;
                if n == 0 {
                    *ended = true;
                }
                Ok(n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(lines: &[&str]) -> HeaderTable {
        let mut h = HeaderTable::new();
        for l in lines {
            h.add_line(l);
        }
        h
    }

    fn status(v: u16) -> StatusCode {
        StatusCode::from_u16(v).unwrap()
    }

    #[test]
    fn head_never_has_body() {
        let h = headers(&["Content-Length: 500"]);
        assert!(!has_body(&Method::HEAD, status(200), &h));
        let r = BodyReader::for_response(&Method::HEAD, status(200), &h);
        assert_eq!(r.mode(), BodyMode::FixedLength(0));
        assert!(r.is_ended());
    }

    #[test]
    fn connect_never_has_body() {
        assert!(!has_body(&Method::CONNECT, status(200), &HeaderTable::new()));
    }

    #[test]
    fn not_modified_without_length() {
        let r = BodyReader::for_response(&Method::GET, status(304), &HeaderTable::new());
        assert_eq!(r.mode(), BodyMode::FixedLength(0));
    }

    #[test]
    fn headers_win_over_bodiless_status() {
        let h = headers(&["Content-Length: 3"]);
        assert!(has_body(&Method::GET, status(204), &h));
        let r = BodyReader::for_response(&Method::GET, status(204), &h);
        assert_eq!(r.mode(), BodyMode::FixedLength(3));

        let h = headers(&["Transfer-Encoding: chunked"]);
        let r = BodyReader::for_response(&Method::GET, status(304), &h);
        assert_eq!(r.mode(), BodyMode::Chunked);
    }

    #[test]
    fn chunked_beats_content_length() {
        let h = headers(&["Content-Length: 10", "Transfer-Encoding: chunked"]);
        let r = BodyReader::for_response(&Method::GET, status(200), &h);
        assert_eq!(r.mode(), BodyMode::Chunked);
    }

    #[test]
    fn invalid_length_is_unknown() {
        let h = headers(&["Content-Length: -1"]);
        let r = BodyReader::for_response(&Method::GET, status(200), &h);
        assert_eq!(r.mode(), BodyMode::UnknownLength);
        assert!(r.is_close_delimited());
    }

    #[test]
    fn fixed_reader_stops_at_length() {
        let mut src: &[u8] = b"hello world";
        let mut r = BodyReader::fixed(5);
        let mut buf = [0; 64];
        assert_eq!(r.read(&mut src, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(r.read(&mut src, &mut buf).unwrap(), 0);
        assert!(r.is_ended());
        assert_eq!(src, b" world");
    }

    #[test]
    fn fixed_reader_short_body() {
        let mut src: &[u8] = b"hel";
        let mut r = BodyReader::fixed(5);
        let mut buf = [0; 64];
        assert_eq!(r.read(&mut src, &mut buf).unwrap(), 3);
        assert!(matches!(
            r.read(&mut src, &mut buf),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn unknown_reader_reads_to_close() {
        let mut src: &[u8] = b"all of it";
        let mut r = BodyReader::for_response(&Method::GET, status(200), &HeaderTable::new());
        let mut buf = [0; 64];
        assert_eq!(r.read(&mut src, &mut buf).unwrap(), 9);
        assert!(!r.is_ended());
        assert_eq!(r.read(&mut src, &mut buf).unwrap(), 0);
        assert!(r.is_ended());
    }

    #[test]
    fn select_fixed_first() {
        let w = BodyWriter::select(&BodyOptions {
            fixed_length: Some(3),
            chunk_size: Some(10),
            chunked_requested: true,
            ..Default::default()
        });
        assert!(matches!(w, BodyWriter::FixedLength { length: 3, .. }));
        assert!(w.is_streaming());
    }

    #[test]
    fn select_chunked() {
        let w = BodyWriter::select(&BodyOptions {
            chunk_size: Some(10),
            ..Default::default()
        });
        let BodyWriter::Chunked(c) = w else {
            panic!("Expected chunked");
        };
        assert_eq!(c.chunk_size(), 10);

        let w = BodyWriter::select(&BodyOptions {
            chunked_requested: true,
            ..Default::default()
        });
        let BodyWriter::Chunked(c) = w else {
            panic!("Expected chunked");
        };
        assert_eq!(c.chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn select_retryable_for_http10() {
        let w = BodyWriter::select(&BodyOptions {
            chunked_requested: true,
            http10: true,
            ..Default::default()
        });
        assert!(!w.is_streaming());
    }

    #[test]
    fn retryable_computes_length() {
        let mut w = BodyWriter::select(&BodyOptions::default());
        let mut out = Vec::new();
        w.write(b"hello", &mut out).unwrap();
        w.write(b" you", &mut out).unwrap();
        assert!(out.is_empty(), "retryable must not touch the socket");
        w.finish(&mut out).unwrap();
        assert_eq!(w.framing_header(), ("Content-Length", "9".to_string()));

        let BodyWriter::Retryable(buf) = &w else {
            panic!("Expected retryable");
        };
        buf.transmit(&mut out).unwrap();
        buf.transmit(&mut out).unwrap();
        assert_eq!(out, b"hello youhello you");
    }

    #[test]
    fn retryable_with_limit() {
        let mut w = BodyWriter::select(&BodyOptions {
            content_length: Some(3),
            ..Default::default()
        });
        let err = w.write(b"four", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::BodyLargerThanContentLength));
    }

    #[test]
    fn fixed_length_short_finish() {
        let mut w = BodyWriter::select(&BodyOptions {
            fixed_length: Some(5),
            ..Default::default()
        });
        let mut out = Vec::new();
        w.write(b"ab", &mut out).unwrap();
        assert_eq!(out, b"ab");
        let err = w.finish(&mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::BodyShorterThanContentLength {
                expected: 5,
                actual: 2
            }
        ));
    }
}
