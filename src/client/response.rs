use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

#[cfg(feature = "gzip")]
use flate2::read::GzDecoder;

use crate::body::BodyReader;
use crate::cache::CacheWriter;
use crate::pool::{ConnectionPool, PooledConnection};
use crate::CloseReason;

/// Response body stream, from [`Session::input_stream`](super::Session::input_stream)
/// or [`Session::error_stream`](super::Session::error_stream).
///
/// The connection goes back to the pool once the body is read to its end.
/// Dropping the stream earlier closes the connection.
pub struct ResponseBody {
    source: Source,
    cache: Option<Box<dyn CacheWriter>>,
}

enum Source {
    Wire(WireBody),
    #[cfg(feature = "gzip")]
    Gzip(GzDecoder<WireBody>),
    Cached(Box<dyn Read + Send>),
}

impl ResponseBody {
    pub(crate) fn wire(
        conn: Option<PooledConnection>,
        reader: BodyReader,
        pool: Arc<ConnectionPool>,
        gunzip: bool,
        cache: Option<Box<dyn CacheWriter>>,
    ) -> Self {
        let wire = WireBody { conn, reader, pool };

        #[cfg(feature = "gzip")]
        let source = if gunzip {
            Source::Gzip(GzDecoder::new(wire))
        } else {
            Source::Wire(wire)
        };

        #[cfg(not(feature = "gzip"))]
        let source = {
            let _ = gunzip;
            Source::Wire(wire)
        };

        ResponseBody { source, cache }
    }

    pub(crate) fn cached(body: Box<dyn Read + Send>) -> Self {
        ResponseBody {
            source: Source::Cached(body),
            cache: None,
        }
    }

    fn read_source(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.source {
            Source::Wire(w) => w.read(buf),
            #[cfg(feature = "gzip")]
            Source::Gzip(g) => {
                let n = g.read(buf)?;
                if n == 0 {
                    // The gzip trailer can end before the framing does.
                    g.get_mut().drain()?;
                }
                Ok(n)
            }
            Source::Cached(c) => c.read(buf),
        }
    }

    fn abort_cache(&mut self) {
        if let Some(writer) = self.cache.take() {
            debug!("Abort cache write");
            writer.abort();
        }
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let n = match self.read_source(buf) {
            Ok(n) => n,
            Err(e) => {
                self.abort_cache();
                return Err(e);
            }
        };

        if n == 0 {
            if let Some(writer) = self.cache.take() {
                if let Err(e) = writer.commit() {
                    warn!("Failed to commit cached response: {}", e);
                }
            }
            return Ok(0);
        }

        if let Some(writer) = &mut self.cache {
            if let Err(e) = writer.write_all(&buf[..n]) {
                warn!("Failed to write cached response: {}", e);
                self.abort_cache();
            }
        }

        Ok(n)
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        self.abort_cache();
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &self.source {
            Source::Wire(w) => Some(w.reader.mode()),
            #[cfg(feature = "gzip")]
            Source::Gzip(g) => Some(g.get_ref().reader.mode()),
            Source::Cached(_) => None,
        };
        f.debug_struct("ResponseBody")
            .field("mode", &mode)
            .field("caching", &self.cache.is_some())
            .finish()
    }
}

/// Body bytes straight off the connection.
struct WireBody {
    conn: Option<PooledConnection>,
    reader: BodyReader,
    pool: Arc<ConnectionPool>,
}

impl WireBody {
    fn release(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if self.reader.is_close_delimited() {
            conn.mark_not_reusable(CloseReason::CloseDelimitedBody);
        }
        self.pool.recycle(conn);
    }

    /// Read past whatever is left of the body, which releases the connection.
    #[cfg(feature = "gzip")]
    fn drain(&mut self) -> io::Result<()> {
        let mut buf = [0_u8; 1024];
        while self.read(&mut buf)? > 0 {}
        Ok(())
    }

    fn close(&mut self, reason: CloseReason) {
        if let Some(mut conn) = self.conn.take() {
            conn.mark_not_reusable(reason);
            conn.close();
        }
    }
}

impl Read for WireBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let Some(conn) = self.conn.as_mut() else {
            if self.reader.is_ended() {
                return Ok(0);
            }
            return Err(crate::Error::ConnectionClosed.into());
        };

        match self.reader.read(conn, buf) {
            Ok(n) => {
                if self.reader.is_ended() {
                    self.release();
                }
                Ok(n)
            }
            Err(e) => {
                let reason = if e.is_transport() {
                    CloseReason::IncompleteResponseBody
                } else {
                    CloseReason::ProtocolError
                };
                self.close(reason);
                Err(e.into())
            }
        }
    }
}

impl Drop for WireBody {
    fn drop(&mut self) {
        self.close(CloseReason::IncompleteResponseBody);
    }
}
