//! Distributed mutual exclusion on top of two atomic server operations.
//!
//! Acquire is `SET key <id> NX EX <secs>`, polled every
//! [`POLL_INTERVAL`] until it stores or the window of `secs` seconds
//! elapses. Contenders are not queued, so acquisition order is not fair.
//! Release runs a compare-and-delete script, so a holder whose lock already
//! expired (and was taken by someone else) cannot delete the new holder's key.

use std::cell::OnceCell;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::command::Command;
use crate::connection::Connection;
use crate::error::{KvError, Result};

/// Pause between acquisition attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

const UNLOCK_SCRIPT: &str =
    "if redis.call('get',KEYS[1])==ARGV[1] then return redis.call('del',KEYS[1]) else return 0 end";

static NEXT_THREAD: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: OnceCell<LockId> = const { OnceCell::new() };
}

/// Value stored under a lock key to prove ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockId(String);

impl LockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity of the calling thread, `<host>:<pid>:<thread>`.
    ///
    /// Computed on first use and then cached for the thread's lifetime, so
    /// later calls return the same value whatever `host` they pass.
    pub fn for_current_thread(host: IpAddr) -> Self {
        THREAD_ID.with(|cell| {
            cell.get_or_init(|| {
                let thread = NEXT_THREAD.fetch_add(1, Ordering::Relaxed);
                Self(format!("{host}:{}:{thread}", std::process::id()))
            })
            .clone()
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Connection {
    /// The calling thread's lock identity, keyed on this connection's local
    /// address.
    ///
    /// Fails with [`KvError::ConnectionClosed`] on a closed connection, which
    /// has no local address to build the identity from.
    pub fn lock_id(&self) -> Result<LockId> {
        let host = self.local_addr()?.ip();
        Ok(LockId::for_current_thread(host))
    }

    /// Try to take `key` for `id`, expiring after `timeout_secs`.
    ///
    /// Retries for up to `timeout_secs` seconds. Returns `Ok(false)` when
    /// the window closes with the key still held elsewhere; connection and
    /// server failures are returned as errors.
    pub fn lock(&mut self, key: &str, id: &LockId, timeout_secs: u64) -> Result<bool> {
        if timeout_secs == 0 {
            return Err(KvError::Parameter("lock timeout must be positive".into()));
        }

        let window = Duration::from_secs(timeout_secs);
        let mut waited = Duration::ZERO;

        while waited < window {
            let mut cmd = Command::new("SET")
                .arg(key)
                .arg(id)
                .arg("NX")
                .arg("EX")
                .arg(timeout_secs);

            match self.execute(&mut cmd) {
                Ok(_) if cmd.message() == "OK" => {
                    tracing::debug!(key, id = %id, "lock acquired");
                    return Ok(true);
                }
                // Nil reply: the key is already held.
                Ok(_) | Err(KvError::NotFound) => {}
                Err(e) => {
                    tracing::warn!(key, error = %e, "lock attempt failed");
                    return Err(e);
                }
            }

            std::thread::sleep(POLL_INTERVAL);
            waited += POLL_INTERVAL;
        }

        tracing::debug!(key, id = %id, "lock not acquired within window");
        Ok(false)
    }

    /// Release `key` if it still holds `id`. Returns whether it was deleted.
    pub fn unlock(&mut self, key: &str, id: &LockId) -> Result<bool> {
        let cmd = self.eval(UNLOCK_SCRIPT, [key], [id.as_str()])?;
        let released = cmd.status() == 1;
        if !released {
            tracing::debug!(key, id = %id, "unlock skipped, key not held by this id");
        }
        Ok(released)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
