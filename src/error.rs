use std::{fmt, io};

use http::Method;

/// Error type for http1-session
#[derive(Debug)]
#[allow(missing_docs)]
#[non_exhaustive]
pub enum Error {
    // transport
    Io(io::Error),
    ConnectionClosed,

    // protocol
    BadStatusLine(String),
    BadHeader(String),
    ChunkLenNotANumber,
    ChunkExpectedCrLf,
    BodyLargerThanContentLength,
    BodyShorterThanContentLength { expected: u64, actual: u64 },
    BodyContentAfterFinish,
    HttpParseFail(String),
    BadLocationHeader(String),
    TunnelFailed(u16),

    // policy
    TooManyRedirects,
    StreamedBodyNotRetryable(u16),
    HeadersAlreadySent,
    OutputStreamTaken,
    InputStreamTaken,
    MethodHasNoBody(Method),
    HttpStatus(u16),
    BadUri(String),
    UnsupportedScheme(String),
    UnsupportedVersion,
}

/// Coarse classification of an [`Error`].
///
/// Callers branch on this to decide whether a failure is worth retrying
/// on their side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket level failure: connect, reset, timeout, unexpected close.
    Transport,
    /// The peer sent something that does not parse as HTTP/1.x.
    Protocol,
    /// The engine refused to continue (redirect ceiling, misuse of the API).
    Policy,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::ConnectionClosed => ErrorKind::Transport,

            Error::BadStatusLine(_)
            | Error::BadHeader(_)
            | Error::ChunkLenNotANumber
            | Error::ChunkExpectedCrLf
            | Error::BodyLargerThanContentLength
            | Error::BodyShorterThanContentLength { .. }
            | Error::BodyContentAfterFinish
            | Error::HttpParseFail(_)
            | Error::BadLocationHeader(_)
            | Error::TunnelFailed(_) => ErrorKind::Protocol,

            Error::TooManyRedirects
            | Error::StreamedBodyNotRetryable(_)
            | Error::HeadersAlreadySent
            | Error::OutputStreamTaken
            | Error::InputStreamTaken
            | Error::MethodHasNoBody(_)
            | Error::HttpStatus(_)
            | Error::BadUri(_)
            | Error::UnsupportedScheme(_)
            | Error::UnsupportedVersion => ErrorKind::Policy,
        }
    }

    pub(crate) fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Unwrap an io::Error that carries one of our errors, as produced when
    /// a body stream reports through the `Read`/`Write` traits.
    pub(crate) fn from_io(e: io::Error) -> Error {
        if e.get_ref().map_or(false, |r| r.is::<Error>()) {
            let kind = e.kind();
            match e.into_inner().map(|b| b.downcast::<Error>()) {
                Some(Ok(v)) => *v,
                _ => Error::Io(io::Error::from(kind)),
            }
        } else if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::ConnectionClosed
        } else {
            Error::Io(e)
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(value: httparse::Error) -> Self {
        Error::HttpParseFail(value.to_string())
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::from_io(value)
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(e) => e,
            Error::ConnectionClosed => io::Error::new(io::ErrorKind::UnexpectedEof, value),
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io: {}", e),
            Error::ConnectionClosed => write!(f, "connection closed before response was complete"),
            Error::BadStatusLine(v) => write!(f, "bad status line: {}", v),
            Error::BadHeader(v) => write!(f, "bad header: {}", v),
            Error::ChunkLenNotANumber => write!(f, "chunk length cannot be read as a number"),
            Error::ChunkExpectedCrLf => write!(f, "chunk expected crlf as next character"),
            Error::BodyLargerThanContentLength => {
                write!(f, "attempt to write larger body than content-length")
            }
            Error::BodyShorterThanContentLength { expected, actual } => write!(
                f,
                "content-length promised {} bytes, but only {} were transferred",
                expected, actual
            ),
            Error::BodyContentAfterFinish => write!(f, "attempt to write body after it was finished"),
            Error::HttpParseFail(v) => write!(f, "http parse fail: {}", v),
            Error::BadLocationHeader(v) => write!(f, "location header is malformed: {}", v),
            Error::TunnelFailed(v) => write!(f, "proxy refused CONNECT tunnel with status {}", v),
            Error::TooManyRedirects => write!(f, "too many redirects"),
            Error::StreamedBodyNotRetryable(v) => {
                write!(f, "cannot retry streamed request body after {} response", v)
            }
            Error::HeadersAlreadySent => write!(f, "request headers already sent"),
            Error::OutputStreamTaken => write!(f, "request body stream already obtained"),
            Error::InputStreamTaken => write!(f, "response body stream already obtained"),
            Error::MethodHasNoBody(m) => write!(f, "method {} does not support a request body", m),
            Error::HttpStatus(v) => write!(f, "http status: {}", v),
            Error::BadUri(v) => write!(f, "bad uri: {}", v),
            Error::UnsupportedScheme(v) => write!(f, "unsupported scheme: {}", v),
            Error::UnsupportedVersion => write!(f, "unsupported http version"),
        }
    }
}
