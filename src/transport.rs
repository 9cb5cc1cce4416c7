//! Byte stream transport consumed by the engine.
//!
//! The engine never opens sockets itself. A [`Dialer`] produces
//! [`Connection`]s, and everything beneath (TCP, TLS, test doubles) is the
//! dialer's business.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// A blocking, bidirectional byte stream to a peer.
pub trait Connection: Read + Write + Send + fmt::Debug {
    /// Bound every subsequent blocking read. `None` blocks forever.
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Close the stream. Further reads and writes fail.
    fn close(&mut self);

    /// Best-effort check that an idle connection is still usable.
    ///
    /// Called by the pool before lending out an idle connection.
    fn is_alive(&mut self) -> bool {
        true
    }

    /// A handle that shuts this stream down from another thread.
    ///
    /// Any read or write blocked on the stream surfaces as an error.
    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        None
    }
}

/// Closes a [`Connection`] from outside the thread that uses it.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<dyn Fn() + Send + Sync>);

impl ShutdownHandle {
    /// Wrap a shutdown closure.
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        ShutdownHandle(Arc::new(f))
    }

    /// Shut the connection down.
    pub fn shutdown(&self) {
        (self.0)()
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle").finish()
    }
}

/// Opens connections.
pub trait Dialer: Send + Sync + fmt::Debug {
    /// Open a plain byte stream to `host:port`.
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> io::Result<Box<dyn Connection>>;

    /// Wrap an established stream in TLS for `host`.
    ///
    /// Used for `https` origins, both direct and inside a CONNECT tunnel.
    fn secure(&self, conn: Box<dyn Connection>, host: &str) -> io::Result<Box<dyn Connection>> {
        let _ = conn;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("no TLS available for {}", host),
        ))
    }
}

/// Plain TCP dialer. Does not do TLS.
#[derive(Debug, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> io::Result<Box<dyn Connection>> {
        let mut last_err = None;

        for addr in (host, port).to_socket_addrs()? {
            let result = match timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };

            match result {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!("Connected to {} ({}:{})", addr, host, port);
                    return Ok(Box::new(TcpConnection::new(stream)));
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address for {}:{}", host, port),
            )
        }))
    }
}

/// [`Connection`] over a `TcpStream`.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl TcpConnection {
    /// Wrap a connected stream.
    pub fn new(stream: TcpStream) -> Self {
        TcpConnection { stream }
    }
}

impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Connection for TcpConnection {
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn is_alive(&mut self) -> bool {
        // A readable idle socket is either closed (0) or has unsolicited
        // data; neither is usable for a new exchange.
        if self.stream.set_nonblocking(true).is_err() {
            return false;
        }
        let mut buf = [0_u8; 1];
        let alive = match self.stream.peek(&mut buf) {
            Err(e) => e.kind() == io::ErrorKind::WouldBlock,
            Ok(_) => false,
        };
        self.stream.set_nonblocking(false).is_ok() && alive
    }

    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        let clone = self.stream.try_clone().ok()?;
        Some(ShutdownHandle::new(move || {
            let _ = clone.shutdown(Shutdown::Both);
        }))
    }
}
