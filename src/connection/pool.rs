//! Bounded connection pool.
//!
//! Connections are created lazily by a factory, at most `max_size` of them
//! live (idle or checked out) at any moment. A checked-out connection comes
//! back through [`PooledConnection`]'s `Drop`: healthy ones rejoin the idle
//! queue, ones that hit a connection-level error (or were explicitly
//! disabled) are dropped, freeing a slot for a fresh connection.
//!
//! When every slot is in use, [`ConnectionPool::get`] waits on a condition
//! variable for up to `checkout_timeout`, then fails with [`KvError::Busy`].
//! The state mutex is `parking_lot` and held only for bookkeeping; the
//! factory runs with it released.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::ConnectionConfig;
use crate::connection::tcp::Connection;
use crate::error::{KvError, Result};

type Factory = dyn Fn() -> Result<Connection> + Send + Sync;

struct PoolState {
    /// Idle connections ready for reuse, most recently returned last.
    idle: VecDeque<Connection>,
    /// Idle plus checked-out connections.
    live: usize,
}

struct Shared {
    state: Mutex<PoolState>,
    available: Condvar,
    factory: Box<Factory>,
    max_size: usize,
    checkout_timeout: Duration,
    idle_timeout: Duration,
}

/// A bounded pool of [`Connection`]s. Cloning shares the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

impl ConnectionPool {
    /// Create a pool whose connections are opened from `config`.
    ///
    /// Every pooled connection connects, authenticates and selects the
    /// database with a copy of `config`; later changes to the caller's copy
    /// do not reach the pool.
    pub fn new(config: ConnectionConfig) -> Self {
        let max_size = config.pool_size;
        let checkout_timeout = Duration::from_millis(config.checkout_timeout_ms);
        let idle_timeout = Duration::from_millis(config.idle_timeout_ms);
        Self::with_factory(max_size, checkout_timeout, idle_timeout, move || {
            Connection::open(config.clone())
        })
    }

    /// Create a pool around an arbitrary connection factory.
    ///
    /// A `max_size` of zero is treated as one.
    pub fn with_factory<F>(
        max_size: usize,
        checkout_timeout: Duration,
        idle_timeout: Duration,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Result<Connection> + Send + Sync + 'static,
    {
        let max_size = max_size.max(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(max_size),
                    live: 0,
                }),
                available: Condvar::new(),
                factory: Box::new(factory),
                max_size,
                checkout_timeout,
                idle_timeout,
            }),
        }
    }

    /// Check out a connection.
    ///
    /// Reuses the most recently returned healthy idle connection, otherwise
    /// creates one if under the limit, otherwise waits for a return. A
    /// factory failure is returned as-is and leaves no entry behind.
    pub fn get(&self) -> Result<PooledConnection> {
        let shared = &*self.shared;
        let deadline = Instant::now() + shared.checkout_timeout;
        let mut stale = Vec::new();
        let mut state = shared.state.lock();

        let outcome = loop {
            if let Some(conn) = self.take_idle(&mut state, &mut stale) {
                break Ok(conn);
            }

            if state.live < shared.max_size {
                state.live += 1;
                let created = MutexGuard::unlocked(&mut state, || (shared.factory)());
                match created {
                    Ok(conn) => {
                        tracing::debug!(live = state.live, max = shared.max_size, "pool created connection");
                        break Ok(conn);
                    }
                    Err(e) => {
                        state.live -= 1;
                        shared.available.notify_one();
                        tracing::warn!(error = %e, "pool failed to create connection");
                        break Err(e);
                    }
                }
            }

            if Instant::now() >= deadline {
                break Err(KvError::Busy(format!(
                    "all {} pooled connections in use after {:?}",
                    shared.max_size, shared.checkout_timeout
                )));
            }
            shared.available.wait_until(&mut state, deadline);
        };

        drop(state);
        drop(stale);

        outcome.map(|conn| PooledConnection {
            conn: Some(conn),
            pool: self.clone(),
            disabled: false,
        })
    }

    /// Pop a reusable idle connection, moving unusable ones into `stale`.
    fn take_idle(&self, state: &mut PoolState, stale: &mut Vec<Connection>) -> Option<Connection> {
        while let Some(conn) = state.idle.pop_back() {
            if conn.is_broken() || conn.last_used.elapsed() > self.shared.idle_timeout {
                state.live -= 1;
                stale.push(conn);
                continue;
            }
            return Some(conn);
        }
        None
    }

    fn release(&self, conn: Connection, disabled: bool) {
        let shared = &*self.shared;
        if disabled || conn.is_broken() {
            {
                let mut state = shared.state.lock();
                state.live -= 1;
            }
            shared.available.notify_one();
            tracing::debug!(
                code = conn.error_code(),
                disabled,
                "evicting pooled connection"
            );
            return;
        }

        shared.state.lock().idle.push_back(conn);
        shared.available.notify_one();
    }

    fn forget(&self) {
        self.shared.state.lock().live -= 1;
        self.shared.available.notify_one();
    }

    /// Number of idle connections waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Number of connections currently alive, idle or checked out.
    pub fn live_count(&self) -> usize {
        self.shared.state.lock().live
    }

    pub fn max_size(&self) -> usize {
        self.shared.max_size
    }
}

/// RAII guard that returns the connection to the pool on drop.
pub struct PooledConnection {
    /// `None` only once [`take`](Self::take) has moved the connection out.
    conn: Option<Connection>,
    pool: ConnectionPool,
    disabled: bool,
}

impl PooledConnection {
    /// Access the underlying connection.
    pub fn conn(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection already taken")
    }

    /// Mark the connection unusable; it is dropped instead of returned.
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    /// Take the connection out of the pool for good, freeing its slot.
    pub fn take(mut self) -> Connection {
        self.pool.forget();
        self.conn.take().expect("connection already taken")
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection already taken")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.disabled);
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
