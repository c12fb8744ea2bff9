//! One request/response round trip over a pooled or fresh connection.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use url::Url;

use super::body::{BodyStream, Release};
use super::codec::{self, RequestFraming, ResponseHead, MAX_HEAD_LEN};
use super::pool::Pool;
use super::{Connection, Connector, PoolKey};
use crate::error::{is_timeout, FetchError};
use crate::headers::Headers;
use crate::http::Method;
use crate::request::Body;

/// Overall time budget shared by every phase and redirect hop of one fetch.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

/// The bound applied to one phase, and the duration reported if it expires.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PhaseLimit {
    pub(crate) timeout: Duration,
    reported: Duration,
}

impl PhaseLimit {
    pub(crate) fn expired(&self) -> FetchError {
        FetchError::Timeout(self.reported)
    }
}

impl Deadline {
    pub(crate) fn new(budget: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    /// Bound a phase by `phase` and by whatever is left of the budget.
    pub(crate) fn limit(&self, phase: Duration) -> Result<PhaseLimit, FetchError> {
        let Some(budget) = self.budget else {
            return Ok(PhaseLimit {
                timeout: phase,
                reported: phase,
            });
        };
        let remaining = budget.saturating_sub(self.start.elapsed());
        if remaining.is_zero() {
            return Err(FetchError::Timeout(budget));
        }
        if remaining < phase {
            Ok(PhaseLimit {
                timeout: remaining,
                reported: budget,
            })
        } else {
            Ok(PhaseLimit {
                timeout: phase,
                reported: phase,
            })
        }
    }
}

/// What a single hop needs from the client.
pub(crate) struct Exchange<'a> {
    pub(crate) connector: &'a dyn Connector,
    pub(crate) pool: &'a Arc<Pool>,
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
}

impl Exchange<'_> {
    /// Send one request and read the response head. The body is left on the
    /// connection, wrapped in the returned stream.
    pub(crate) fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &Headers,
        body: &Body,
        deadline: &Deadline,
    ) -> Result<(ResponseHead, BodyStream), FetchError> {
        let key = PoolKey::from_url(url)?;
        let framing = RequestFraming::for_body(method, body);

        let mut conn = self.connection(&key, deadline)?;
        let source = body.source()?;

        let limit = deadline.limit(self.read_timeout)?;
        conn.set_io_timeout(Some(limit.timeout))?;
        let head = codec::encode_request_head(method, url, headers, framing);
        trace!("> {}", String::from_utf8_lossy(&head).trim_end());
        let written = conn
            .write_all(&head)
            .and_then(|()| codec::write_body(&mut conn, source))
            .and_then(|()| conn.flush());
        if let Err(err) = written {
            return Err(if is_timeout(&err) { limit.expired() } else { err.into() });
        }

        let (head, leftover) = read_head(conn.as_mut(), deadline, self.read_timeout)?;
        trace!("< {} {} ({} headers)", head.status, head.reason, head.headers.len());

        let framing = codec::response_framing(method, &head)?;
        // After 101 the connection no longer speaks HTTP/1.1.
        let keep_alive = head.keep_alive() && head.status != 101;
        conn.set_io_timeout(Some(self.read_timeout))?;
        let stream = BodyStream::new(
            conn,
            leftover,
            framing,
            keep_alive,
            Some(Release {
                pool: Arc::clone(self.pool),
                key,
            }),
            Some(self.read_timeout),
        );
        Ok((head, stream))
    }

    fn connection(&self, key: &PoolKey, deadline: &Deadline) -> Result<Box<dyn Connection>, FetchError> {
        if let Some(conn) = self.pool.acquire(key) {
            debug!("reusing idle connection to {key}");
            return Ok(conn);
        }
        let limit = deadline.limit(self.connect_timeout)?;
        debug!("opening connection to {key}");
        self.connector
            .connect(key, Some(limit.timeout))
            .map_err(|source| {
                if is_timeout(&source) {
                    limit.expired()
                } else {
                    FetchError::Connection {
                        target: key.to_string(),
                        source,
                    }
                }
            })
    }
}

/// Read until a final (non-1xx) response head is complete. Returns the head
/// and any bytes that arrived after it.
fn read_head(
    conn: &mut dyn Connection,
    deadline: &Deadline,
    read_timeout: Duration,
) -> Result<(ResponseHead, Vec<u8>), FetchError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    loop {
        if let Some((head, len)) = codec::parse_response_head(&buf)? {
            if head.is_informational() && head.status != 101 {
                trace!("skipping interim {} response", head.status);
                buf.drain(..len);
                continue;
            }
            let leftover = buf.split_off(len);
            return Ok((head, leftover));
        }
        if buf.len() > MAX_HEAD_LEN {
            return Err(FetchError::Protocol(format!(
                "response head larger than {MAX_HEAD_LEN} bytes"
            )));
        }

        let limit = deadline.limit(read_timeout)?;
        conn.set_io_timeout(Some(limit.timeout))?;
        let n = match conn.read(&mut chunk) {
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) if is_timeout(&err) => return Err(limit.expired()),
            Err(err) => return Err(err.into()),
        };
        if n == 0 {
            return Err(FetchError::Protocol(if buf.is_empty() {
                "connection closed before a response was received".to_string()
            } else {
                "connection closed inside the response head".to_string()
            }));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
