//! Session configuration.

use std::time::Duration;

use http::Version;

use crate::body::DEFAULT_CHUNK_SIZE;
use crate::header::DefaultHeaders;
use crate::pool::DEFAULT_MAX_IDLE_PER_KEY;
use crate::proxy::Proxy;

/// Fixed ceiling of followed redirects per logical request.
pub const MAX_REDIRECTS: u32 = 5;

/// Immutable settings shared by all sessions of a [`Client`](crate::client::Client).
///
/// ```
/// use std::time::Duration;
/// use http1_session::config::Config;
///
/// let config = Config::new()
///     .follow_redirects(false)
///     .read_timeout(Some(Duration::from_secs(10)))
///     .user_agent("my-agent/1.0");
///
/// assert!(!config.is_follow_redirects());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) follow_redirects: bool,
    pub(crate) version: Version,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) chunk_size: usize,
    pub(crate) use_caches: bool,
    pub(crate) user_agent: String,
    pub(crate) default_headers: DefaultHeaders,
    pub(crate) max_idle_per_key: usize,
    pub(crate) keep_alive: bool,
    pub(crate) proxy: Option<Proxy>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            follow_redirects: true,
            version: Version::HTTP_11,
            connect_timeout: None,
            read_timeout: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            use_caches: true,
            user_agent: concat!("http1-session/", env!("CARGO_PKG_VERSION")).to_string(),
            default_headers: DefaultHeaders::new(),
            max_idle_per_key: DEFAULT_MAX_IDLE_PER_KEY,
            keep_alive: true,
            proxy: None,
        }
    }
}

impl Config {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow 3xx redirects. Defaults to `true`.
    pub fn follow_redirects(mut self, v: bool) -> Self {
        self.follow_redirects = v;
        self
    }

    /// HTTP version of requests. Only 1.0 and 1.1 are valid, 1.1 is default.
    ///
    /// HTTP/1.0 requests never use chunked bodies or keep-alive.
    pub fn version(mut self, v: Version) -> Self {
        self.version = v;
        self
    }

    /// Timeout for establishing a connection. Defaults to none.
    pub fn connect_timeout(mut self, v: Option<Duration>) -> Self {
        self.connect_timeout = v;
        self
    }

    /// Timeout for each blocking read. Defaults to none.
    pub fn read_timeout(mut self, v: Option<Duration>) -> Self {
        self.read_timeout = v;
        self
    }

    /// Chunk size used when chunked transfer is requested through the
    /// `transfer-encoding` header. Defaults to 1024.
    pub fn chunk_size(mut self, v: usize) -> Self {
        self.chunk_size = v.max(1);
        self
    }

    /// Consult the response cache, when one is installed. Defaults to `true`.
    pub fn use_caches(mut self, v: bool) -> Self {
        self.use_caches = v;
        self
    }

    /// Value of the `user-agent` header when the caller sets none.
    pub fn user_agent(mut self, v: impl Into<String>) -> Self {
        self.user_agent = v.into();
        self
    }

    /// Headers every new session starts out with.
    pub fn default_headers(mut self, v: DefaultHeaders) -> Self {
        self.default_headers = v;
        self
    }

    /// Idle connections kept per connection key. 0 disables pooling.
    pub fn max_idle_per_key(mut self, v: usize) -> Self {
        self.max_idle_per_key = v;
        self
    }

    /// Ask servers to keep connections open. Defaults to `true`.
    pub fn keep_alive(mut self, v: bool) -> Self {
        self.keep_alive = v;
        self
    }

    /// Use this proxy for every request instead of asking the proxy selector.
    pub fn proxy(mut self, v: Option<Proxy>) -> Self {
        self.proxy = v;
        self
    }

    /// Whether redirects are followed.
    pub fn is_follow_redirects(&self) -> bool {
        self.follow_redirects
    }
}
