//! Keyed cache of idle connections.
//!
//! The pool is the one object shared between sessions. A connection is
//! either idle in the pool or lent to exactly one session.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use http::Uri;

use crate::ext::UriExt;
use crate::head::read_response_head;
use crate::proxy::Proxy;
use crate::transport::{Connection, Dialer, ShutdownHandle, TcpDialer};
use crate::util::log_data;
use crate::{CloseReason, Error};

/// Max idle connections kept per key unless configured otherwise.
pub const DEFAULT_MAX_IDLE_PER_KEY: usize = 5;

/// Identity of a connection. Requests with equal keys may share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    /// `http` or `https`.
    pub scheme: String,
    /// Origin host, lowercase.
    pub host: String,
    /// Origin port.
    pub port: u16,
    /// Proxy `host:port`, if any.
    pub proxy: Option<(String, u16)>,
    /// Whether a CONNECT tunnel goes through the proxy.
    pub tunnel_required: bool,
}

impl ConnectionKey {
    /// Key for reaching `uri` through `proxy`.
    pub fn new(uri: &Uri, proxy: &Proxy) -> Result<Self, Error> {
        let scheme = uri.scheme_or_http().as_str().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(Error::UnsupportedScheme(scheme));
        }

        let proxy = match proxy {
            Proxy::Direct => None,
            Proxy::Http { host, port } => Some((host.to_ascii_lowercase(), *port)),
        };

        Ok(ConnectionKey {
            tunnel_required: proxy.is_some() && scheme == "https",
            host: uri.host_or_err()?.to_ascii_lowercase(),
            port: uri.port_or_default(),
            scheme,
            proxy,
        })
    }

    /// Tell if requests go to a plain HTTP proxy in absolute-form.
    pub fn is_plain_proxy(&self) -> bool {
        self.proxy.is_some() && !self.tunnel_required
    }

    fn is_https(&self) -> bool {
        self.scheme == "https"
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)?;
        if let Some((h, p)) = &self.proxy {
            write!(f, " via {}:{}", h, p)?;
            if self.tunnel_required {
                write!(f, " (tunnel)")?;
            }
        }
        Ok(())
    }
}

/// A live connection lent out by the pool.
pub struct PooledConnection {
    key: ConnectionKey,
    stream: BufReader<Box<dyn Connection>>,
    close_reason: Option<CloseReason>,
    recycled: bool,
}

impl PooledConnection {
    fn new(key: ConnectionKey, conn: Box<dyn Connection>, recycled: bool) -> Self {
        PooledConnection {
            key,
            stream: BufReader::new(conn),
            close_reason: None,
            recycled,
        }
    }

    /// The key this connection was made for.
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Tell if the connection may go back to the pool.
    pub fn is_reusable(&self) -> bool {
        self.close_reason.is_none()
    }

    /// Why this connection will be closed, if it will.
    pub fn close_reason(&self) -> Option<&'static str> {
        self.close_reason.map(|r| r.explain())
    }

    /// Mark the connection as not reusable. The first reason sticks.
    pub fn mark_not_reusable(&mut self, reason: CloseReason) {
        if self.close_reason.is_none() {
            debug!("Connection {} not reusable: {}", self.key, reason.explain());
            self.close_reason = Some(reason);
        }
    }

    /// Tell if this came from the idle set rather than a fresh dial.
    pub fn was_recycled(&self) -> bool {
        self.recycled
    }

    /// Bound blocking reads.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.get_mut().set_timeout(timeout)
    }

    /// Handle to shut the socket down from another thread.
    pub fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        self.stream.get_ref().shutdown_handle()
    }

    /// Close the socket.
    pub fn close(mut self) {
        debug!(
            "Close connection {}: {}",
            self.key,
            self.close_reason().unwrap_or("closed by caller")
        );
        self.stream.get_mut().close();
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("key", &self.key)
            .field("close_reason", &self.close_reason)
            .field("recycled", &self.recycled)
            .finish()
    }
}

impl Read for PooledConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl BufRead for PooledConnection {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.stream.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.stream.consume(amt)
    }
}

impl Write for PooledConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let r = self.stream.get_mut().write(buf);
        if r.is_err() {
            self.mark_not_reusable(CloseReason::WriteFailed);
        }
        r
    }

    fn flush(&mut self) -> io::Result<()> {
        let r = self.stream.get_mut().flush();
        if r.is_err() {
            self.mark_not_reusable(CloseReason::WriteFailed);
        }
        r
    }
}

/// Shared cache of idle connections, keyed by [`ConnectionKey`].
pub struct ConnectionPool {
    dialer: Arc<dyn Dialer>,
    idle: Mutex<HashMap<ConnectionKey, Vec<Box<dyn Connection>>>>,
    max_idle_per_key: usize,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(Arc::new(TcpDialer), DEFAULT_MAX_IDLE_PER_KEY)
    }
}

impl ConnectionPool {
    /// Pool dialing new connections through `dialer`.
    ///
    /// A `max_idle_per_key` of 0 disables pooling.
    pub fn new(dialer: Arc<dyn Dialer>, max_idle_per_key: usize) -> Self {
        ConnectionPool {
            dialer,
            idle: Mutex::new(HashMap::new()),
            max_idle_per_key,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionKey, Vec<Box<dyn Connection>>>> {
        // An idle list is consistent even if a holder panicked.
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lend an idle connection for `key`, or dial a new one.
    ///
    /// An idle connection found dead is discarded and a fresh one dialed.
    /// `proxy_auth` is sent with a CONNECT when a tunnel is dialed.
    pub fn get(
        &self,
        key: &ConnectionKey,
        connect_timeout: Option<Duration>,
        proxy_auth: Option<&str>,
    ) -> Result<PooledConnection, Error> {
        let candidate = self.lock().get_mut(key).and_then(|v| v.pop());

        if let Some(mut conn) = candidate {
            if conn.is_alive() {
                debug!("Reuse idle connection {}", key);
                return Ok(PooledConnection::new(key.clone(), conn, true));
            }
            debug!("Discard dead idle connection {}", key);
            conn.close();
        }

        self.connect_fresh(key, connect_timeout, proxy_auth)
    }

    /// Dial a new connection for `key`, bypassing the idle set.
    pub fn connect_fresh(
        &self,
        key: &ConnectionKey,
        connect_timeout: Option<Duration>,
        proxy_auth: Option<&str>,
    ) -> Result<PooledConnection, Error> {
        debug!("Dial {}", key);

        let conn = match &key.proxy {
            None => {
                let conn = self.dialer.connect(&key.host, key.port, connect_timeout)?;
                if key.is_https() {
                    self.dialer.secure(conn, &key.host)?
                } else {
                    conn
                }
            }
            Some((host, port)) => {
                let conn = self.dialer.connect(host, *port, connect_timeout)?;
                if key.tunnel_required {
                    let conn = establish_tunnel(conn, key, proxy_auth)?;
                    self.dialer.secure(conn, &key.host)?
                } else {
                    conn
                }
            }
        };

        Ok(PooledConnection::new(key.clone(), conn, false))
    }

    /// Take back a connection after use.
    ///
    /// Only reusable connections with no unread bytes are kept, the rest
    /// are closed.
    pub fn recycle(&self, mut conn: PooledConnection) {
        if !conn.stream.buffer().is_empty() {
            conn.mark_not_reusable(CloseReason::ProtocolError);
        }

        if !conn.is_reusable() || self.max_idle_per_key == 0 {
            conn.close();
            return;
        }

        let PooledConnection { key, stream, .. } = conn;
        let inner = stream.into_inner();

        let mut idle = self.lock();
        let list = idle.entry(key.clone()).or_default();

        if list.len() >= self.max_idle_per_key {
            // Oldest goes first.
            let mut oldest = list.remove(0);
            oldest.close();
        }

        debug!("Recycle connection {}", key);
        list.push(inner);
    }

    /// Number of idle connections for `key`.
    pub fn idle_count(&self, key: &ConnectionKey) -> usize {
        self.lock().get(key).map(|v| v.len()).unwrap_or(0)
    }

    /// Close every idle connection.
    pub fn clear(&self) {
        let mut idle = self.lock();
        for (_, list) in idle.drain() {
            for mut conn in list {
                conn.close();
            }
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let idle: usize = self.lock().values().map(|v| v.len()).sum();
        f.debug_struct("ConnectionPool")
            .field("dialer", &self.dialer)
            .field("idle", &idle)
            .field("max_idle_per_key", &self.max_idle_per_key)
            .finish()
    }
}

fn establish_tunnel(
    conn: Box<dyn Connection>,
    key: &ConnectionKey,
    proxy_auth: Option<&str>,
) -> Result<Box<dyn Connection>, Error> {
    let mut req = Vec::with_capacity(128);
    write!(
        req,
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n",
        host = key.host,
        port = key.port
    )?;
    if let Some(auth) = proxy_auth {
        write!(req, "Proxy-Authorization: {}\r\n", auth)?;
    }
    write!(req, "\r\n")?;

    log_data(&req);

    let mut reader = BufReader::new(conn);
    reader.get_mut().write_all(&req)?;
    reader.get_mut().flush()?;

    let (status, _) = read_response_head(&mut reader)?;

    if !status.status.is_success() {
        debug!("Tunnel to {} refused: {}", key, status.status);
        reader.get_mut().close();
        return Err(Error::TunnelFailed(status.status.as_u16()));
    }

    if !reader.buffer().is_empty() {
        reader.get_mut().close();
        return Err(Error::HttpParseFail("data after CONNECT response".into()));
    }

    debug!("Tunnel established to {}", key);
    Ok(reader.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test::mock::{MockDialer, Script};

    fn key(uri: &str) -> ConnectionKey {
        ConnectionKey::new(&uri.parse().unwrap(), &Proxy::Direct).unwrap()
    }

    #[test]
    fn key_equality() {
        assert_eq!(key("http://A.test/x"), key("http://a.test:80/y"));
        assert_ne!(key("http://a.test/"), key("https://a.test/"));

        let via = ConnectionKey::new(&"https://a.test/".parse().unwrap(), &Proxy::http("p", 8))
            .unwrap();
        assert!(via.tunnel_required);
        assert!(!via.is_plain_proxy());
        assert_ne!(via, key("https://a.test/"));
    }

    #[test]
    fn key_rejects_other_schemes() {
        let err = ConnectionKey::new(&"ftp://a.test/".parse().unwrap(), &Proxy::Direct);
        assert!(matches!(err, Err(Error::UnsupportedScheme(_))));
    }

    #[test]
    fn recycle_and_reuse() {
        let dialer = MockDialer::new();
        dialer.push("a.test", Script::new());
        let pool = ConnectionPool::new(Arc::new(dialer.clone()), 5);
        let k = key("http://a.test/");

        let conn = pool.get(&k, None, None).unwrap();
        assert!(!conn.was_recycled());
        pool.recycle(conn);
        assert_eq!(pool.idle_count(&k), 1);

        let conn = pool.get(&k, None, None).unwrap();
        assert!(conn.was_recycled());
        assert_eq!(dialer.dial_count(), 1);
        assert_eq!(pool.idle_count(&k), 0);
        conn.close();
    }

    #[test]
    fn not_reusable_is_closed() {
        let dialer = MockDialer::new();
        let script = Script::new();
        dialer.push("a.test", script.clone());
        let pool = ConnectionPool::new(Arc::new(dialer), 5);
        let k = key("http://a.test/");

        let mut conn = pool.get(&k, None, None).unwrap();
        conn.mark_not_reusable(CloseReason::ServerConnectionClose);
        pool.recycle(conn);

        assert_eq!(pool.idle_count(&k), 0);
        assert!(script.is_closed());
    }

    #[test]
    fn dead_idle_connection_is_replaced() {
        let dialer = MockDialer::new();
        let first = Script::new();
        dialer.push("a.test", first.clone());
        dialer.push("a.test", Script::new());
        let pool = ConnectionPool::new(Arc::new(dialer.clone()), 5);
        let k = key("http://a.test/");

        let conn = pool.get(&k, None, None).unwrap();
        pool.recycle(conn);
        first.set_dead();

        let conn = pool.get(&k, None, None).unwrap();
        assert!(!conn.was_recycled());
        assert!(first.is_closed());
        assert_eq!(dialer.dial_count(), 2);
    }

    #[test]
    fn idle_limit_closes_oldest() {
        let dialer = MockDialer::new();
        let first = Script::new();
        dialer.push("a.test", first.clone());
        dialer.push("a.test", Script::new());
        let pool = ConnectionPool::new(Arc::new(dialer), 1);
        let k = key("http://a.test/");

        let c1 = pool.get(&k, None, None).unwrap();
        let c2 = pool.get(&k, None, None).unwrap();
        pool.recycle(c1);
        pool.recycle(c2);

        assert_eq!(pool.idle_count(&k), 1);
        assert!(first.is_closed());
    }

    #[test]
    fn clear_closes_idle() {
        let dialer = MockDialer::new();
        let script = Script::new();
        dialer.push("a.test", script.clone());
        let pool = ConnectionPool::new(Arc::new(dialer), 5);
        let k = key("http://a.test/");

        let conn = pool.get(&k, None, None).unwrap();
        pool.recycle(conn);
        pool.clear();

        assert_eq!(pool.idle_count(&k), 0);
        assert!(script.is_closed());
    }

    #[test]
    fn tunnel_through_proxy() {
        let dialer = MockDialer::new().with_tls();
        let script = Script::new().respond("HTTP/1.1 200 Connection established\r\n\r\n");
        dialer.push("proxy.test", script.clone());
        let pool = ConnectionPool::new(Arc::new(dialer.clone()), 5);

        let k = ConnectionKey::new(
            &"https://a.test/".parse().unwrap(),
            &Proxy::http("proxy.test", 3128),
        )
        .unwrap();

        let conn = pool.get(&k, None, Some("Basic cDpw")).unwrap();
        let sent = script.written_string();
        assert!(sent.starts_with("CONNECT a.test:443 HTTP/1.1\r\n"));
        assert!(sent.contains("Proxy-Authorization: Basic cDpw\r\n"));
        assert_eq!(dialer.secured_hosts(), ["a.test"]);
        conn.close();
    }

    #[test]
    fn tunnel_refused() {
        let dialer = MockDialer::new().with_tls();
        let script = Script::new().respond("HTTP/1.1 403 Forbidden\r\n\r\n");
        dialer.push("proxy.test", script.clone());
        let pool = ConnectionPool::new(Arc::new(dialer), 5);

        let k = ConnectionKey::new(
            &"https://a.test/".parse().unwrap(),
            &Proxy::http("proxy.test", 3128),
        )
        .unwrap();

        let err = pool.get(&k, None, None).unwrap_err();
        assert!(matches!(err, Error::TunnelFailed(403)));
        assert!(script.is_closed());
    }
}
