/// Reasons for not returning a connection to the pool.
///
/// After an exchange the session decides whether the connection can be
/// recycled. Any recorded reason means it is closed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// HTTP/1.0 requires each request-response to end with a close.
    Http10,

    /// Client sent `connection: close`.
    ClientConnectionClose,

    /// Server sent `connection: close`.
    ServerConnectionClose,

    /// Response body is close delimited.
    ///
    /// We do not know how much body data to receive. The socket will be closed
    /// when it's done. This is HTTP/1.0 semantics.
    CloseDelimitedBody,

    /// The request body was not fully transmitted.
    IncompleteRequestBody,

    /// The response body was not read to its end.
    IncompleteResponseBody,

    /// A write on the socket failed.
    WriteFailed,

    /// The peer sent something we could not parse.
    ProtocolError,

    /// A retry demanded a fresh connection (other origin, other proxy).
    NewConnectionRetry,

    /// The exchange failed midway.
    ExchangeFailed,
}

impl CloseReason {
    pub(crate) fn explain(&self) -> &'static str {
        match self {
            CloseReason::Http10 => "version is http1.0",
            CloseReason::ClientConnectionClose => "client sent Connection: close",
            CloseReason::ServerConnectionClose => "server sent Connection: close",
            CloseReason::CloseDelimitedBody => "response body is close delimited",
            CloseReason::IncompleteRequestBody => "request body was not fully sent",
            CloseReason::IncompleteResponseBody => "response body was not fully read",
            CloseReason::WriteFailed => "write to socket failed",
            CloseReason::ProtocolError => "peer violated the protocol",
            CloseReason::NewConnectionRetry => "retry requires a new connection",
            CloseReason::ExchangeFailed => "request failed",
        }
    }
}
