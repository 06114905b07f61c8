//! Timeout-bounded byte stream.
//!
//! Wraps a `tokio::net::TcpStream` with per-call send/receive deadlines and
//! the retry policy used for socket stalls: a send or receive that hits its
//! deadline (or a transient would-block) is retried, but more than
//! [`MAX_STALLS`] consecutive non-productive attempts abort with a timeout.
//! A transfer of more than [`PROGRESS_BYTES`] bytes resets the streak, so a
//! trickle of tiny transfers still counts against it.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};

use crate::error::{KvError, Result};

/// Consecutive non-productive attempts tolerated before a timeout.
pub const MAX_STALLS: u32 = 100;
/// Transfers larger than this reset the stall streak.
pub const PROGRESS_BYTES: usize = 8;

/// One connected duplex stream.
pub struct Transport {
    stream: TcpStream,
    send_timeout: Duration,
    recv_timeout: Duration,
}

impl Transport {
    /// Connect to `host:port` without waiting longer than `timeout`.
    ///
    /// The connect is issued non-blocking and awaited for writability; on
    /// readiness the socket's pending error is checked before success is
    /// declared. Every resolved address is tried within the one deadline.
    pub async fn connect_timeout(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let attempt = async {
            let mut last_err = None;
            for addr in lookup_host((host, port)).await? {
                match TcpStream::connect(addr).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => last_err = Some(e),
                }
            }
            Err::<TcpStream, io::Error>(last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
            }))
        };

        let stream = match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(KvError::Network(e)),
            Err(_) => {
                return Err(KvError::Timeout(format!(
                    "connection to {host}:{port} timed out after {timeout:?}"
                )))
            }
        };

        if let Some(e) = stream.take_error().map_err(KvError::Network)? {
            return Err(KvError::Network(e));
        }
        stream.set_nodelay(true).ok(); // Disable Nagle for low latency

        Ok(Self {
            stream,
            send_timeout: timeout,
            recv_timeout: timeout,
        })
    }

    /// Bound every subsequent send attempt.
    pub fn set_send_timeout(&mut self, timeout: Duration) {
        self.send_timeout = timeout;
    }

    /// Bound every subsequent receive attempt.
    pub fn set_recv_timeout(&mut self, timeout: Duration) {
        self.recv_timeout = timeout;
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream.local_addr().map_err(KvError::Io)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(KvError::Io)
    }

    /// Send all of `buf`. Returns the number of bytes written.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut written = 0;
        let mut stalls = 0;

        while written < buf.len() {
            match tokio::time::timeout(self.send_timeout, self.stream.write(&buf[written..])).await {
                Ok(Ok(0)) => {
                    return Err(KvError::Network(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    )))
                }
                Ok(Ok(n)) => {
                    stall(&mut stalls, n, "send")?;
                    written += n;
                }
                Ok(Err(e)) if is_transient(&e) => stall(&mut stalls, 0, "send")?,
                Ok(Err(e)) => return Err(KvError::Network(e)),
                Err(_) => stall(&mut stalls, 0, "send")?,
            }
        }

        Ok(written)
    }

    /// Receive into `buf`.
    ///
    /// With `require_full`, keeps reading until `buf` is full under the
    /// same stall policy as [`write`](Self::write). Otherwise makes a single
    /// attempt: returns the bytes read, or `0` when the receive deadline
    /// passed with nothing to read.
    pub async fn read(&mut self, buf: &mut [u8], require_full: bool) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if !require_full {
            return match tokio::time::timeout(self.recv_timeout, self.stream.read(buf)).await {
                Ok(Ok(0)) => Err(KvError::ConnectionClosed),
                Ok(Ok(n)) => Ok(n),
                Ok(Err(e)) if is_transient(&e) => Ok(0),
                Ok(Err(e)) => Err(KvError::Network(e)),
                Err(_) => Ok(0),
            };
        }

        let mut filled = 0;
        let mut stalls = 0;

        while filled < buf.len() {
            match tokio::time::timeout(self.recv_timeout, self.stream.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => return Err(KvError::ConnectionClosed),
                Ok(Ok(n)) => {
                    stall(&mut stalls, n, "receive")?;
                    filled += n;
                }
                Ok(Err(e)) if is_transient(&e) => stall(&mut stalls, 0, "receive")?,
                Ok(Err(e)) => return Err(KvError::Network(e)),
                Err(_) => stall(&mut stalls, 0, "receive")?,
            }
        }

        Ok(filled)
    }

    /// Shut down the write half; the socket closes when dropped.
    pub async fn close(&mut self) {
        self.stream.shutdown().await.ok();
    }
}

/// Account one attempt that moved `n` bytes.
fn stall(stalls: &mut u32, n: usize, op: &str) -> Result<()> {
    if n > PROGRESS_BYTES {
        *stalls = 0;
        return Ok(());
    }
    *stalls += 1;
    if *stalls > MAX_STALLS {
        tracing::warn!(op, stalls = *stalls, "socket stalled, giving up");
        return Err(KvError::Timeout(format!(
            "{op} made no progress after {MAX_STALLS} attempts"
        )));
    }
    Ok(())
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

// ── Tests ──────────────────────────────────────────────────────────
