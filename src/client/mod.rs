//! HTTP/1.1 client sessions.
//!
//! A [`Client`] holds what is shared between requests: configuration, the
//! connection pool and the collaborators (proxy selector, authenticator,
//! response cache and cookie store). Cloning a client is cheap, all clones
//! share one pool.
//!
//! [`Client::open`] creates a [`Session`] for one logical request. The
//! session is single use. Headers and method are set first, an optional
//! body is written through [`Session::output_stream`], and the first call to
//! a response accessor drives the request to completion:
//!
//! * **Connect** - lend a connection from the pool or dial one, trying the
//!   proxies from the [`ProxySelector`] in order.
//! * **Send** - write request line, headers and body.
//! * **Receive** - read the response head, skipping `1xx` responses.
//! * **Retry** - ask [`retry::decide()`](crate::retry::decide) whether the
//!   response is final. Redirects and auth challenges start over, either on
//!   the same socket or on a new one.
//!
//! # Example
//!
//! ```no_run
//! use std::io::{Read, Write};
//! use http1_session::client::Client;
//! use http1_session::http::Method;
//!
//! let client = Client::new();
//!
//! let mut session = client.open("http://example.test/upload").unwrap();
//! session.set_method(Method::POST).unwrap();
//! session.set_header("content-type", "text/plain").unwrap();
//!
//! // Without a fixed length or chunked mode, the body is buffered
//! // and sent with a computed content-length.
//! session.output_stream().unwrap().write_all(b"hello").unwrap();
//!
//! if session.response_code().unwrap().is_success() {
//!     let mut body = String::new();
//!     session.input_stream().unwrap().read_to_string(&mut body).unwrap();
//! }
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use http::{Uri, Version};

use crate::auth::Authenticator;
use crate::cache::{CookieStore, ResponseCache};
use crate::config::Config;
use crate::ext::UriExt;
use crate::pool::ConnectionPool;
use crate::proxy::{NoProxy, ProxySelector};
use crate::transport::{Dialer, TcpDialer};
use crate::Error;

mod request;
mod response;
mod session;

pub use request::RequestBody;
pub use response::ResponseBody;
pub use session::{CancelHandle, Session};

#[cfg(test)]
pub(crate) mod test;

/// Entry point for creating sessions.
#[derive(Clone)]
pub struct Client {
    pub(crate) config: Arc<Config>,
    pub(crate) pool: Arc<ConnectionPool>,
    pub(crate) proxy_selector: Arc<dyn ProxySelector>,
    pub(crate) authenticator: Option<Arc<dyn Authenticator>>,
    pub(crate) cache: Option<Arc<dyn ResponseCache>>,
    pub(crate) cookies: Option<Arc<dyn CookieStore>>,
}

impl Client {
    /// Client with default configuration, plain TCP and no proxy.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The configuration sessions start out with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Create a session for `uri`.
    ///
    /// Nothing is sent until the request is executed.
    pub fn open(&self, uri: &str) -> Result<Session, Error> {
        let uri = Uri::from_str(uri).map_err(|e| Error::BadUri(format!("{}: {}", uri, e)))?;
        self.open_uri(uri)
    }

    /// Create a session for an already parsed uri.
    pub fn open_uri(&self, uri: Uri) -> Result<Session, Error> {
        let version = self.config.version;
        if version != Version::HTTP_10 && version != Version::HTTP_11 {
            return Err(Error::UnsupportedVersion);
        }

        let scheme = uri.scheme_or_http().as_str();
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Err(Error::UnsupportedScheme(scheme.to_string()));
        }
        uri.host_or_err()?;

        Ok(Session::new(self.clone(), uri))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("proxy_selector", &self.proxy_selector)
            .finish()
    }
}

/// Builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    config: Config,
    dialer: Arc<dyn Dialer>,
    proxy_selector: Arc<dyn ProxySelector>,
    authenticator: Option<Arc<dyn Authenticator>>,
    cache: Option<Arc<dyn ResponseCache>>,
    cookies: Option<Arc<dyn CookieStore>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder {
            config: Config::default(),
            dialer: Arc::new(TcpDialer),
            proxy_selector: Arc::new(NoProxy),
            authenticator: None,
            cache: None,
            cookies: None,
        }
    }
}

impl ClientBuilder {
    /// Use this configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Open connections through this dialer. Defaults to [`TcpDialer`].
    pub fn dialer(mut self, dialer: impl Dialer + 'static) -> Self {
        self.dialer = Arc::new(dialer);
        self
    }

    /// Choose proxies with this selector. Defaults to [`NoProxy`].
    pub fn proxy_selector(mut self, selector: impl ProxySelector + 'static) -> Self {
        self.proxy_selector = Arc::new(selector);
        self
    }

    /// Answer `401` and `407` challenges with this authenticator.
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Serve and store responses through this cache.
    pub fn cache(mut self, cache: impl ResponseCache + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Keep cookies in this store.
    pub fn cookie_store(mut self, store: impl CookieStore + 'static) -> Self {
        self.cookies = Some(Arc::new(store));
        self
    }

    /// Finish the client.
    pub fn build(self) -> Client {
        let pool = ConnectionPool::new(self.dialer, self.config.max_idle_per_key);
        Client {
            config: Arc::new(self.config),
            pool: Arc::new(pool),
            proxy_selector: self.proxy_selector,
            authenticator: self.authenticator,
            cache: self.cache,
            cookies: self.cookies,
        }
    }
}
