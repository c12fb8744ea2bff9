//! Connections, connectors, and the HTTP/1.1 exchange over them.
//!
//! # Design
//! The transport is split at two seams:
//! - `Connector` opens a fresh `Connection` for a `PoolKey`. The production
//!   implementation is `TcpConnector`; tests substitute in-memory doubles to
//!   control latency and scripted responses.
//! - `Connection` is any `Read + Write + Send` stream that can bound its own
//!   I/O with a socket timeout and report whether it is still usable after
//!   sitting idle in the pool.
//!
//! `exchange` drives one request/response round trip on top of these, `codec`
//! owns the wire format, `body` owns response body framing, and `pool` owns
//! idle connection bookkeeping.

pub mod body;
pub mod codec;
pub(crate) mod exchange;
pub mod pool;
mod tcp;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use url::{Host, Url};

use crate::error::FetchError;
use crate::http::Scheme;

pub use tcp::TcpConnector;

/// A bidirectional byte stream to one origin.
pub trait Connection: Read + Write + Send {
    /// Bound every subsequent read and write. `None` blocks indefinitely.
    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Whether an idle connection can carry another request. Implementations
    /// should report `false` once the peer has closed or sent unsolicited data.
    fn is_reusable(&mut self) -> bool {
        true
    }
}

/// Opens new connections.
pub trait Connector: Send + Sync {
    /// Connect to `key`, giving up after `timeout` when one is set.
    ///
    /// An error of kind `TimedOut` or `WouldBlock` is reported to the caller
    /// as `FetchError::Timeout`; anything else as `FetchError::Connection`.
    fn connect(&self, key: &PoolKey, timeout: Option<Duration>) -> io::Result<Box<dyn Connection>>;
}

/// Identity of a reusable connection: scheme, host, and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: Scheme,
    /// Host name or IP literal, without IPv6 brackets.
    pub host: String,
    pub port: u16,
}

impl PoolKey {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub fn from_url(url: &Url) -> Result<Self, FetchError> {
        let scheme = Scheme::from_url(url)
            .ok_or_else(|| FetchError::invalid_url(url.as_str(), "unsupported scheme"))?;
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(FetchError::invalid_url(url.as_str(), "missing host")),
        };
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(Self { scheme, host, port })
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", self.scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}
