//! Response cache and cookie storage capabilities.
//!
//! Both are best-effort: failures are logged and never abort a request.

use std::fmt;
use std::io::{self, Read, Write};

use http::{Method, Uri};

use crate::header::HeaderTable;

/// A stored response, served without touching the network.
pub struct CacheEntry {
    /// Status line and headers of the stored response.
    pub headers: HeaderTable,
    /// The stored body.
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("headers", &self.headers)
            .finish()
    }
}

/// Receives a response body as the caller reads it.
pub trait CacheWriter: Write + Send {
    /// The body was read to its end.
    fn commit(self: Box<Self>) -> io::Result<()>;

    /// The body could not be read completely, drop what was stored.
    fn abort(self: Box<Self>);
}

/// Persistent response cache.
pub trait ResponseCache: Send + Sync + fmt::Debug {
    /// Look up a stored response for a request about to be sent.
    fn get(&self, uri: &Uri, method: &Method, request_headers: &HeaderTable) -> Option<CacheEntry>;

    /// Offer a final response for storage.
    ///
    /// Returning a writer means the body should be copied into it.
    fn put(&self, uri: &Uri, response_headers: &HeaderTable) -> io::Result<Option<Box<dyn CacheWriter>>>;
}

/// Cookie storage.
pub trait CookieStore: Send + Sync + fmt::Debug {
    /// Cookie headers to add to a request, as `(header name, values)`.
    ///
    /// The name is usually `Cookie`.
    fn get(&self, uri: &Uri, request_headers: &HeaderTable) -> io::Result<Vec<(String, Vec<String>)>>;

    /// Store cookies from a response head.
    fn put(&self, uri: &Uri, response_headers: &HeaderTable) -> io::Result<()>;
}
