//! TCP and TLS connections backed by `std::net` and `rustls`.

use std::fmt::Display;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use log::{debug, trace};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use super::{Connection, Connector, PoolKey};
use crate::http::Scheme;

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Production connector: DNS lookup, TCP connect, and TLS for `https`.
///
/// The TLS configuration is built on first use and shared by every
/// connection the connector opens afterwards.
#[derive(Default)]
pub struct TcpConnector {
    tls: OnceLock<Arc<ClientConfig>>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-provided TLS configuration, e.g. with private roots.
    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        let tls = OnceLock::new();
        let _ = tls.set(config);
        Self { tls }
    }

    fn tls_config(&self) -> io::Result<Arc<ClientConfig>> {
        if let Some(config) = self.tls.get() {
            return Ok(Arc::clone(config));
        }
        let config = default_tls_config()?;
        Ok(Arc::clone(self.tls.get_or_init(|| config)))
    }
}

impl std::fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnector")
            .field("tls_ready", &self.tls.get().is_some())
            .finish()
    }
}

impl Connector for TcpConnector {
    fn connect(&self, key: &PoolKey, timeout: Option<Duration>) -> io::Result<Box<dyn Connection>> {
        // DNS time counts against `timeout`, though the lookup itself cannot be cut short.
        let end = timeout.map(|timeout| Instant::now() + timeout);
        let addrs: Vec<_> = (key.host.as_str(), key.port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {}", key.host),
            ));
        }

        let stream = connect_each(&addrs, end, |addr, remaining| match remaining {
            Some(remaining) => TcpStream::connect_timeout(addr, remaining),
            None => TcpStream::connect(addr),
        })?;
        stream.set_nodelay(true)?;
        debug!("connected to {key} via {:?}", stream.peer_addr().ok());

        match key.scheme {
            Scheme::Http => Ok(Box::new(stream)),
            Scheme::Https => {
                let name = ServerName::try_from(key.host.clone())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                let tls = ClientConnection::new(self.tls_config()?, name).map_err(io::Error::other)?;
                Ok(Box::new(StreamOwned::new(tls, stream)))
            }
        }
    }
}

/// Try `addrs` in order until one connects. Every attempt gets only what is
/// left before `end`, so a list of unreachable addresses cannot outlast it.
fn connect_each<A: Display, T>(
    addrs: &[A],
    end: Option<Instant>,
    mut attempt: impl FnMut(&A, Option<Duration>) -> io::Result<T>,
) -> io::Result<T> {
    let mut last_err = None;
    for addr in addrs {
        let remaining = match end {
            Some(end) => {
                let left = end.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"));
                }
                Some(left)
            }
            None => None,
        };
        trace!("trying {addr}");
        match attempt(addr, remaining) {
            Ok(conn) => return Ok(conn),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| io::ErrorKind::NotConnected.into()))
}

fn default_tls_config() -> io::Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(io::Error::other)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Non-blocking peek: alive sockets have nothing to say while idle.
fn socket_is_idle(sock: &TcpStream) -> bool {
    if sock.set_nonblocking(true).is_err() {
        return false;
    }
    let mut probe = [0u8; 1];
    let idle = matches!(sock.peek(&mut probe), Err(ref e) if e.kind() == io::ErrorKind::WouldBlock);
    sock.set_nonblocking(false).is_ok() && idle
}

impl Connection for TcpStream {
    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }

    fn is_reusable(&mut self) -> bool {
        socket_is_idle(self)
    }
}

impl Connection for TlsStream {
    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.sock.set_read_timeout(timeout)?;
        self.sock.set_write_timeout(timeout)
    }

    fn is_reusable(&mut self) -> bool {
        !self.conn.wants_write() && socket_is_idle(&self.sock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn connects_over_plain_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let key = PoolKey::new(Scheme::Http, "127.0.0.1", port);

        let mut conn = TcpConnector::new()
            .connect(&key, Some(Duration::from_secs(1)))
            .unwrap();
        let (mut server, _) = listener.accept().unwrap();
        assert!(conn.is_reusable());

        server.write_all(b"x").unwrap();
        server.flush().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!conn.is_reusable(), "unsolicited bytes make a connection unusable");
    }

    #[test]
    fn closed_peer_is_not_reusable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let key = PoolKey::new(Scheme::Http, "127.0.0.1", port);

        let mut conn = TcpConnector::new().connect(&key, None).unwrap();
        let (server, _) = listener.accept().unwrap();
        drop(server);
        std::thread::sleep(Duration::from_millis(50));
        assert!(!conn.is_reusable());
    }

    #[test]
    fn unreachable_addresses_share_one_deadline() {
        let budget = Duration::from_millis(60);
        let started = Instant::now();
        let mut attempts = 0;
        let err = connect_each(&["a", "b", "c"], Some(started + budget), |_, remaining| {
            attempts += 1;
            std::thread::sleep(remaining.unwrap());
            Err::<(), _>(io::Error::from(io::ErrorKind::TimedOut))
        })
        .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(attempts, 1);
        assert!(started.elapsed() < budget * 2);
    }

    #[test]
    fn later_address_gets_what_is_left() {
        let budget = Duration::from_secs(5);
        let mut seen = Vec::new();
        let picked = connect_each(&["refused", "ok"], Some(Instant::now() + budget), |addr, remaining| {
            seen.push(remaining.unwrap());
            match *addr {
                "ok" => Ok(*addr),
                _ => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
            }
        })
        .unwrap();

        assert_eq!(picked, "ok");
        assert!(seen.iter().all(|remaining| *remaining <= budget));
        assert!(seen[1] <= seen[0]);
    }

    #[test]
    fn last_error_is_reported() {
        let err = connect_each(&["a", "b"], None, |_, remaining| {
            assert!(remaining.is_none());
            Err::<(), _>(io::Error::from(io::ErrorKind::ConnectionRefused))
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn custom_tls_config_is_used() {
        let config = default_tls_config().unwrap();
        let connector = TcpConnector::with_tls_config(Arc::clone(&config));
        assert!(Arc::ptr_eq(&connector.tls_config().unwrap(), &config));
        assert!(format!("{connector:?}").contains("tls_ready: true"));
    }

    #[test]
    fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let key = PoolKey::new(Scheme::Http, "127.0.0.1", port);
        assert!(TcpConnector::new().connect(&key, Some(Duration::from_secs(1))).is_err());
    }
}
