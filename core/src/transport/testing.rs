//! In-memory transport doubles for unit tests.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::{Connection, Connector, PoolKey};

/// Sleep for `delay`, or fail with `TimedOut` if `timeout` is shorter.
fn simulate_latency(delay: Duration, timeout: Option<Duration>) -> io::Result<()> {
    if delay.is_zero() {
        return Ok(());
    }
    match timeout {
        Some(timeout) if timeout < delay => {
            thread::sleep(timeout);
            Err(io::ErrorKind::TimedOut.into())
        }
        _ => {
            thread::sleep(delay);
            Ok(())
        }
    }
}

/// A connection that replays a fixed byte script and records writes.
///
/// Responses added with `followed_by` become readable one at a time, each
/// after the previous one has been read in full and a new request written.
pub(crate) struct ScriptedConnection {
    input: Cursor<Vec<u8>>,
    queued: VecDeque<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
    read_delay: Duration,
    max_read: usize,
    timeout: Option<Duration>,
    alive: bool,
}

impl ScriptedConnection {
    pub(crate) fn new(script: &[u8]) -> Self {
        Self {
            input: Cursor::new(script.to_vec()),
            queued: VecDeque::new(),
            written: Arc::default(),
            read_delay: Duration::ZERO,
            max_read: usize::MAX,
            timeout: None,
            alive: true,
        }
    }

    pub(crate) fn followed_by(mut self, script: &[u8]) -> Self {
        self.queued.push_back(script.to_vec());
        self
    }

    pub(crate) fn dead(mut self) -> Self {
        self.alive = false;
        self
    }

    pub(crate) fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Hand out at most `n` bytes per read call.
    pub(crate) fn max_read(mut self, n: usize) -> Self {
        self.max_read = n;
        self
    }

    pub(crate) fn sharing_writes(mut self, written: Arc<Mutex<Vec<u8>>>) -> Self {
        self.written = written;
        self
    }
}

impl Read for ScriptedConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        simulate_latency(self.read_delay, self.timeout)?;
        let limit = buf.len().min(self.max_read);
        self.input.read(&mut buf[..limit])
    }
}

impl Write for ScriptedConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let exhausted = self.input.position() as usize >= self.input.get_ref().len();
        if exhausted {
            if let Some(next) = self.queued.pop_front() {
                self.input = Cursor::new(next);
            }
        }
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for ScriptedConnection {
    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn is_reusable(&mut self) -> bool {
        self.alive
    }
}

/// A connector handing out one scripted connection per connect call.
pub(crate) struct ScriptedConnector {
    scripts: Mutex<VecDeque<Vec<Vec<u8>>>>,
    connect_delay: Duration,
    read_delay: Duration,
    connects: AtomicUsize,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedConnector {
    pub(crate) fn new<I, S>(scripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self {
            scripts: Mutex::new(scripts.into_iter().map(|s| vec![s.as_ref().to_vec()]).collect()),
            connect_delay: Duration::ZERO,
            read_delay: Duration::ZERO,
            connects: AtomicUsize::new(0),
            written: Arc::default(),
        }
    }

    /// A single keep-alive connection answering each request in turn.
    pub(crate) fn keep_alive<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let connector = Self::new(Vec::<Vec<u8>>::new());
        let responses = responses.into_iter().map(|s| s.as_ref().to_vec()).collect();
        connector.scripts.lock().unwrap().push_back(responses);
        connector
    }

    pub(crate) fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub(crate) fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Everything written to any connection, in order.
    pub(crate) fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.lock().unwrap()).into_owned()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _key: &PoolKey, timeout: Option<Duration>) -> io::Result<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        simulate_latency(self.connect_delay, timeout)?;
        let responses = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(io::ErrorKind::ConnectionRefused)?;
        let mut responses = responses.into_iter();
        let mut conn = ScriptedConnection::new(&responses.next().unwrap_or_default())
            .read_delay(self.read_delay)
            .sharing_writes(Arc::clone(&self.written));
        for next in responses {
            conn = conn.followed_by(&next);
        }
        Ok(Box::new(conn))
    }
}
