//! Streaming response bodies.
//!
//! # Design
//! A `BodyStream` owns the connection its response arrived on. Bytes that
//! were read past the end of the head are chained in front of the socket so
//! nothing is lost. When the body ends cleanly and the server allowed
//! keep-alive, the connection is handed back to the pool; in every other case
//! (error, early drop, read-until-close) it is simply closed.

use std::fmt;
use std::io::{self, BufRead, BufReader, Chain, Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use log::trace;

use super::codec::ResponseFraming;
use super::pool::Pool;
use super::{Connection, PoolKey};
use crate::error::{is_timeout, FetchError};

/// Longest chunk-size or trailer line accepted.
const MAX_LINE: u64 = 8 * 1024;

/// Bytes `close()` will read to reach the end of a body before giving up.
const DRAIN_LIMIT: usize = 64 * 1024;

type WireReader = BufReader<Chain<Cursor<Vec<u8>>, Box<dyn Connection>>>;

/// Where a connection goes once its body has been fully read.
pub(crate) struct Release {
    pub(crate) pool: Arc<Pool>,
    pub(crate) key: PoolKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Length { remaining: u64 },
    /// `remaining == 0` means a chunk-size line comes next.
    Chunked { remaining: u64 },
    UntilClose,
    Done,
}

/// A response body read incrementally from the network.
pub struct BodyStream {
    reader: Option<WireReader>,
    state: State,
    keep_alive: bool,
    release: Option<Release>,
    read_timeout: Option<Duration>,
}

impl BodyStream {
    pub(crate) fn new(
        conn: Box<dyn Connection>,
        leftover: Vec<u8>,
        framing: ResponseFraming,
        keep_alive: bool,
        release: Option<Release>,
        read_timeout: Option<Duration>,
    ) -> Self {
        let state = match framing {
            ResponseFraming::Empty | ResponseFraming::Length(0) => State::Done,
            ResponseFraming::Length(remaining) => State::Length { remaining },
            ResponseFraming::Chunked => State::Chunked { remaining: 0 },
            ResponseFraming::UntilClose => State::UntilClose,
        };
        let mut stream = Self {
            reader: Some(BufReader::new(Cursor::new(leftover).chain(conn))),
            state,
            keep_alive: keep_alive && framing != ResponseFraming::UntilClose,
            release,
            read_timeout,
        };
        if stream.state == State::Done {
            stream.finish();
        }
        stream
    }

    /// Whether the end of the body has been reached.
    pub fn is_finished(&self) -> bool {
        self.state == State::Done
    }

    /// Read whatever is left of the body.
    pub fn read_all(&mut self) -> Result<Vec<u8>, FetchError> {
        let mut out = Vec::new();
        self.read_to_end(&mut out).map_err(|e| self.fetch_error(e))?;
        Ok(out)
    }

    /// Stop reading. A short remainder is drained so the connection can be
    /// reused; otherwise the connection is closed.
    pub fn close(mut self) {
        if !self.keep_alive {
            return;
        }
        let mut sink = [0u8; 8 * 1024];
        let mut drained = 0;
        while !self.is_finished() && drained < DRAIN_LIMIT {
            match self.read(&mut sink) {
                Ok(0) | Err(_) => break,
                Ok(n) => drained += n,
            }
        }
    }

    pub(crate) fn fetch_error(&self, err: io::Error) -> FetchError {
        if is_timeout(&err) {
            FetchError::Timeout(self.read_timeout.unwrap_or_default())
        } else if matches!(err.kind(), io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof) {
            FetchError::Protocol(err.to_string())
        } else {
            FetchError::Io(err)
        }
    }

    fn wire(&mut self) -> io::Result<&mut WireReader> {
        self.reader
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "body connection already released"))
    }

    fn read_length(&mut self, buf: &mut [u8], remaining: u64) -> io::Result<usize> {
        let max = remaining.min(buf.len() as u64) as usize;
        let n = self.wire()?.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed with {remaining} body bytes outstanding"),
            ));
        }
        let left = remaining - n as u64;
        if left == 0 {
            self.finish();
        } else {
            self.state = State::Length { remaining: left };
        }
        Ok(n)
    }

    fn read_chunked(&mut self, buf: &mut [u8], remaining: u64) -> io::Result<usize> {
        let remaining = if remaining == 0 {
            let size = chunk_size(self.wire()?)?;
            if size == 0 {
                skip_trailers(self.wire()?)?;
                self.finish();
                return Ok(0);
            }
            size
        } else {
            remaining
        };

        let max = remaining.min(buf.len() as u64) as usize;
        let wire = self.wire()?;
        let n = wire.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside a chunk",
            ));
        }
        let left = remaining - n as u64;
        if left == 0 && !read_line(wire)?.is_empty() {
            return Err(invalid_data("chunk data not followed by CRLF"));
        }
        self.state = State::Chunked { remaining: left };
        Ok(n)
    }

    fn read_until_close(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.wire()?.read(buf)?;
        if n == 0 {
            self.finish();
        }
        Ok(n)
    }

    fn finish(&mut self) {
        self.state = State::Done;
        let Some(reader) = self.reader.take() else {
            return;
        };
        let Some(release) = self.release.take() else {
            return;
        };
        if !self.keep_alive || !reader.buffer().is_empty() {
            trace!("closing connection to {} after body", release.key);
            return;
        }
        let (leftover, conn) = reader.into_inner().into_inner();
        if (leftover.position() as usize) < leftover.get_ref().len() {
            trace!("closing connection to {}: unread bytes after body", release.key);
            return;
        }
        release.pool.release(&release.key, conn);
    }
}

impl Read for BodyStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.state {
            State::Done => Ok(0),
            State::Length { remaining } => self.read_length(buf, remaining),
            State::Chunked { remaining } => self.read_chunked(buf, remaining),
            State::UntilClose => self.read_until_close(buf),
        }
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("state", &self.state)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// One CRLF- or LF-terminated line, without the terminator.
fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    let n = reader.by_ref().take(MAX_LINE).read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed inside chunked body",
        ));
    }
    if line.pop() != Some(b'\n') {
        return Err(invalid_data("chunked body line too long or truncated"));
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(line)
}

/// Parse a chunk-size line, ignoring chunk extensions.
fn chunk_size<R: BufRead>(reader: &mut R) -> io::Result<u64> {
    let line = read_line(reader)?;
    let text = std::str::from_utf8(&line).map_err(|_| invalid_data("chunk size is not ASCII"))?;
    let size = text.split(';').next().unwrap_or_default().trim();
    u64::from_str_radix(size, 16).map_err(|_| invalid_data("invalid chunk size"))
}

fn skip_trailers<R: BufRead>(reader: &mut R) -> io::Result<()> {
    while !read_line(reader)?.is_empty() {}
    Ok(())
}
