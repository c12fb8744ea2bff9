//! Idle connection pool.
//!
//! # Design
//! One `Mutex<HashMap<PoolKey, Vec<Idle>>>` guards bookkeeping only: the lock
//! is taken to push or pop an idle connection and released before any I/O,
//! including the liveness probe run on a popped connection. Each key keeps a
//! stack so the most recently used connection is reused first; the oldest
//! idle connection is evicted when a key goes over its limit.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::trace;

use super::{Connection, PoolKey};
use crate::config::PoolConfig;

struct Idle {
    conn: Box<dyn Connection>,
    since: Instant,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub hosts: usize,
}

/// Idle connections keyed by (scheme, host, port).
pub struct Pool {
    config: PoolConfig,
    idle: Mutex<HashMap<PoolKey, Vec<Idle>>>,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Take an idle connection for `key` that is still usable, if any.
    pub fn acquire(&self, key: &PoolKey) -> Option<Box<dyn Connection>> {
        loop {
            let candidate = {
                let mut idle = self.lock();
                let stack = idle.get_mut(key)?;
                let candidate = stack.pop();
                if stack.is_empty() {
                    idle.remove(key);
                }
                candidate?
            };

            if candidate.since.elapsed() > self.config.idle_timeout {
                trace!("dropping expired idle connection to {key}");
                continue;
            }
            let mut conn = candidate.conn;
            if conn.is_reusable() {
                return Some(conn);
            }
            trace!("dropping dead idle connection to {key}");
        }
    }

    /// Return a connection that finished a clean exchange.
    pub fn release(&self, key: &PoolKey, conn: Box<dyn Connection>) {
        if self.config.max_idle_per_host == 0 {
            return;
        }
        let evicted = {
            let mut idle = self.lock();
            let stack = idle.entry(key.clone()).or_default();
            stack.push(Idle {
                conn,
                since: Instant::now(),
            });
            if stack.len() > self.config.max_idle_per_host {
                Some(stack.remove(0))
            } else {
                None
            }
        };
        trace!("released connection to {key} (evicted: {})", evicted.is_some());
        drop(evicted);
    }

    /// Number of idle connections held for `key`.
    pub fn idle_count(&self, key: &PoolKey) -> usize {
        self.lock().get(key).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.lock();
        PoolStats {
            idle: idle.values().map(Vec::len).sum(),
            hosts: idle.len(),
        }
    }

    /// Close every idle connection.
    pub fn clear(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        drop(drained);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PoolKey, Vec<Idle>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
