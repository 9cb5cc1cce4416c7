//! Proxy choice.

use std::fmt;
use std::io;

use http::Uri;

/// Where a connection goes first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Proxy {
    /// Straight to the origin.
    Direct,
    /// Through an HTTP proxy.
    Http {
        /// Proxy host.
        host: String,
        /// Proxy port.
        port: u16,
    },
}

impl Proxy {
    /// An HTTP proxy at `host:port`.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Proxy::Http {
            host: host.into(),
            port,
        }
    }

    /// Tell if this is no proxy at all.
    pub fn is_direct(&self) -> bool {
        matches!(self, Proxy::Direct)
    }

    /// Read the proxy address out of a `305 Use Proxy` location.
    ///
    /// A leading `<scheme>:` matching the current uri and a `//` are
    /// skipped, the rest is read as `host[:port]`. Port defaults to 80.
    pub(crate) fn from_use_proxy_location(current: &Uri, location: &str) -> Option<Proxy> {
        let mut rest = location.trim();

        let scheme = current.scheme_str().unwrap_or("http");
        let same_scheme = rest
            .get(..scheme.len())
            .map_or(false, |p| p.eq_ignore_ascii_case(scheme));
        if same_scheme {
            if let Some(after) = rest[scheme.len()..].strip_prefix(':') {
                rest = after;
            }
        }
        rest = rest.strip_prefix("//").unwrap_or(rest);

        let authority = rest.split('/').next().unwrap_or_default();

        let (host, port) = match authority.rfind(':') {
            Some(i) => (&authority[..i], authority[i + 1..].parse::<u16>().ok()?),
            None => (authority, 80),
        };

        if host.is_empty() {
            return None;
        }

        Some(Proxy::http(host, port))
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proxy::Direct => write!(f, "DIRECT"),
            Proxy::Http { host, port } => write!(f, "http://{}:{}", host, port),
        }
    }
}

/// Chooses proxies for a target uri.
pub trait ProxySelector: Send + Sync + fmt::Debug {
    /// Candidates in order of preference. An empty list means direct.
    fn select(&self, uri: &Uri) -> Vec<Proxy>;

    /// Told when connecting through `proxy` failed.
    fn notify_failed(&self, uri: &Uri, proxy: &Proxy, err: &io::Error) {
        let _ = (uri, proxy, err);
    }
}

/// Never use a proxy.
#[derive(Debug, Default)]
pub struct NoProxy;

impl ProxySelector for NoProxy {
    fn select(&self, _uri: &Uri) -> Vec<Proxy> {
        vec![Proxy::Direct]
    }
}

/// The same candidates for every uri.
#[derive(Debug, Clone)]
pub struct StaticProxies(pub Vec<Proxy>);

impl ProxySelector for StaticProxies {
    fn select(&self, _uri: &Uri) -> Vec<Proxy> {
        self.0.clone()
    }
}
