use std::io::{BufRead, Read, Write};

use crate::util::read_line;
use crate::Error;

/// Default size of an outgoing chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Encodes a body as `transfer-encoding: chunked`.
///
/// Input is collected until a full chunk is available, then written as
/// `<hex len>\r\n<data>\r\n`. [`finish()`](Self::finish) flushes the rest and
/// writes the terminating zero chunk.
#[derive(Debug)]
pub struct ChunkedEncoder {
    chunk_size: usize,
    pending: Vec<u8>,
    ended: bool,
}

impl ChunkedEncoder {
    /// New encoder emitting chunks of at most `chunk_size` bytes.
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        ChunkedEncoder {
            chunk_size,
            pending: Vec::with_capacity(chunk_size),
            ended: false,
        }
    }

    /// The configured chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Tell if the terminating chunk was written.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Consume all of `input`, writing any full chunks to `out`.
    pub fn write(&mut self, mut input: &[u8], out: &mut dyn Write) -> Result<usize, Error> {
        if self.ended {
            return Err(Error::BodyContentAfterFinish);
        }

        let total = input.len();

        while !input.is_empty() {
            let room = self.chunk_size - self.pending.len();
            let take = room.min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];

            if self.pending.len() == self.chunk_size {
                self.write_pending(out)?;
            }
        }

        Ok(total)
    }

    /// Send whatever is buffered as a (short) chunk.
    pub fn flush(&mut self, out: &mut dyn Write) -> Result<(), Error> {
        if !self.pending.is_empty() {
            self.write_pending(out)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Send the remainder and the zero chunk. Idempotent.
    pub fn finish(&mut self, out: &mut dyn Write) -> Result<(), Error> {
        if self.ended {
            return Ok(());
        }
        if !self.pending.is_empty() {
            self.write_pending(out)?;
        }
        out.write_all(b"0\r\n\r\n")?;
        out.flush()?;
        self.ended = true;
        Ok(())
    }

    fn write_pending(&mut self, out: &mut dyn Write) -> Result<(), Error> {
        write!(out, "{:x}\r\n", self.pending.len())?;
        out.write_all(&self.pending)?;
        out.write_all(b"\r\n")?;
        self.pending.clear();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
    Done,
}

/// Decodes a `transfer-encoding: chunked` body.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkState,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    /// Decoder positioned before the first chunk size line.
    pub fn new() -> Self {
        ChunkedDecoder {
            state: ChunkState::Size,
        }
    }

    /// Tell if the zero chunk and trailers were consumed.
    pub fn is_ended(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Read decoded body bytes from `src` into `buf`.
    ///
    /// `Ok(0)` means the body is complete (or `buf` is empty).
    pub fn read(&mut self, src: &mut dyn BufRead, buf: &mut [u8]) -> Result<usize, Error> {
        loop {
            match self.state {
                ChunkState::Size => {
                    let line = read_line(src)?.ok_or(Error::ConnectionClosed)?;
                    let len = parse_chunk_size(&line)?;
                    self.state = if len == 0 {
                        ChunkState::Trailers
                    } else {
                        ChunkState::Data(len)
                    };
                }

                ChunkState::Data(left) => {
                    if buf.is_empty() {
                        return Ok(0);
                    }
                    let max = (buf.len() as u64).min(left) as usize;
                    let n = src.read(&mut buf[..max])?;
                    if n == 0 {
                        return Err(Error::ConnectionClosed);
                    }
                    let left = left - n as u64;
                    self.state = if left == 0 {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(left)
                    };
                    return Ok(n);
                }

                ChunkState::DataEnd => {
                    let line = read_line(src)?.ok_or(Error::ConnectionClosed)?;
                    if !line.is_empty() {
                        return Err(Error::ChunkExpectedCrLf);
                    }
                    self.state = ChunkState::Size;
                }

                ChunkState::Trailers => match read_line(src)? {
                    // Trailers are discarded.
                    Some(line) if !line.is_empty() => {
                        trace!("Discard trailer: {}", line);
                    }
                    _ => {
                        self.state = ChunkState::Done;
                    }
                },

                ChunkState::Done => return Ok(0),
            }
        }
    }
}

fn parse_chunk_size(line: &str) -> Result<u64, Error> {
    let mut raw = Vec::with_capacity(line.len() + 2);
    raw.extend_from_slice(line.as_bytes());
    raw.extend_from_slice(b"\r\n");

    match httparse::parse_chunk_size(&raw) {
        Ok(httparse::Status::Complete((_, size))) => Ok(size),
        _ => Err(Error::ChunkLenNotANumber),
    }
}
