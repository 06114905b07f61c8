//! A single connection to a key-value server.
//!
//! Owns one [`Transport`] plus a fixed-capacity receive buffer, and runs the
//! command state machine: serialize, write, then read into the buffer and
//! re-parse until the reply is complete, malformed, too large for the
//! buffer, or idle for longer than the configured timeout.
//!
//! The API is blocking. Each call bridges to the shared runtime through
//! [`runtime::block_on`], so it must not be called from async code.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::command::Command;
use crate::config::ConnectionConfig;
use crate::connection::transport::Transport;
use crate::error::{is_connection_code, KvError, Result, FAIL};
use crate::resp::parser::parse;
use crate::resp::types::RespValue;
use crate::runtime;

pub struct Connection {
    transport: Option<Transport>,
    config: ConnectionConfig,
    /// Receive buffer; its length is the configured capacity.
    buf: BytesMut,
    connected_once: bool,
    code: i64,
    status: i64,
    msg: String,
    /// Timestamp of last successful command (for idle checks).
    pub last_used: Instant,
}

impl Connection {
    /// An unconnected connection holding `config`; see [`connect`](Self::connect).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            transport: None,
            config,
            buf: BytesMut::new(),
            connected_once: false,
            code: 0,
            status: 0,
            msg: String::new(),
            last_used: Instant::now(),
        }
    }

    /// Connect, authenticate and select the database described by `config`.
    pub fn open(config: ConnectionConfig) -> Result<Self> {
        let mut conn = Self::new(config);
        conn.connect()?;
        Ok(conn)
    }

    /// Connect to `host:port` with default parameters and no credential.
    pub fn connect_to(host: &str, port: u16) -> Result<Self> {
        Self::open(ConnectionConfig::new(host, port))
    }

    /// Establish the socket and run the handshake with the stored parameters.
    pub fn connect(&mut self) -> Result<()> {
        self.close();
        let result = self.establish();
        if let Err(e) = &result {
            self.code = e.code();
            self.msg = e.to_string();
            self.close();
        }
        result
    }

    /// Re-run [`connect`](Self::connect) with the parameters of the last
    /// successful connect, re-authenticating if a credential is set.
    pub fn reconnect(&mut self) -> Result<()> {
        if !self.connected_once {
            return Err(KvError::Parameter(
                "reconnect requires a prior successful connect".into(),
            ));
        }
        tracing::info!(addr = %self.config.addr(), "reconnecting");
        self.connect()
    }

    fn establish(&mut self) -> Result<()> {
        self.config.validate()?;
        let addr = self.config.addr();

        let mut transport = runtime::block_on(Transport::connect_timeout(
            &self.config.host,
            self.config.port,
            self.config.timeout(),
        ))
        .map_err(|e| {
            tracing::warn!(addr = %addr, error = %e, "connect failed");
            e
        })?;
        transport.set_send_timeout(self.config.socket_timeout());
        transport.set_recv_timeout(self.config.socket_timeout());

        if self.buf.len() != self.config.buffer_size {
            self.buf = BytesMut::zeroed(self.config.buffer_size);
        }
        self.transport = Some(transport);
        self.code = 0;
        self.msg.clear();

        if let Some(password) = self.config.password.clone() {
            self.auth(&password)?;
        }
        self.select_db(self.config.db)?;

        self.connected_once = true;
        tracing::debug!(addr = %addr, db = self.config.db, "connected");
        Ok(())
    }

    /// Drop the socket. The stored parameters survive for [`reconnect`](Self::reconnect).
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            runtime::block_on(async move {
                transport.close().await;
                Ok(())
            })
            .ok();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport()?.local_addr()
    }

    fn transport(&self) -> Result<&Transport> {
        self.transport.as_ref().ok_or(KvError::ConnectionClosed)
    }

    /// Authenticate with `password` (and the configured username, if any).
    ///
    /// The credential is remembered for [`reconnect`](Self::reconnect).
    /// An empty password is a no-op.
    pub fn auth(&mut self, password: &str) -> Result<()> {
        if password.is_empty() {
            self.config.password = None;
            return Ok(());
        }
        self.config.password = Some(password.to_string());

        let mut cmd = Command::new("AUTH");
        if let Some(user) = &self.config.username {
            cmd.add(user);
        }
        cmd.add(password);

        match self.execute(&mut cmd) {
            Ok(_) => Ok(()),
            Err(KvError::Server { message, .. }) => {
                tracing::warn!(addr = %self.config.addr(), "authentication rejected");
                let err = KvError::AuthFailed(message);
                self.code = err.code();
                Err(err)
            }
            Err(e) => Err(e),
        }
    }

    /// Select a database index. Index 0 is the server default and sends nothing.
    pub fn select_db(&mut self, db: u16) -> Result<()> {
        if db != 0 {
            self.execute(&mut Command::new("SELECT").arg(db))?;
        }
        self.config.db = db;
        Ok(())
    }

    /// Execute `cmd` and record its reply in it.
    ///
    /// Returns the element count for array replies and [`OK`](crate::error::OK)
    /// for scalar replies. A server error reply is [`KvError::Server`]
    /// with the server's text; an absent bulk reply is [`KvError::NotFound`].
    pub fn execute(&mut self, cmd: &mut Command) -> Result<i64> {
        cmd.reset();
        let outcome = match runtime::block_on(self.round_trip(cmd)) {
            Ok(value) => cmd.absorb(value),
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(code) => {
                self.code = *code;
                self.last_used = Instant::now();
            }
            Err(e) => {
                self.code = e.code();
                if cmd.message().is_empty() {
                    cmd.set_message(e.to_string());
                }
                if e.is_connection_error() {
                    tracing::debug!(addr = %self.config.addr(), error = %e, "command failed on connection");
                }
            }
        }
        self.status = cmd.status();
        self.msg = cmd.message().to_string();
        outcome
    }

    /// Execute an argv-like list and hand back the populated command.
    pub fn call<I, S>(&mut self, args: I) -> Result<Command>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = Command::from_args(args);
        if cmd.args().is_empty() {
            return Err(KvError::Parameter("empty command".into()));
        }
        self.execute(&mut cmd)?;
        Ok(cmd)
    }

    /// Write the request, then accumulate and re-parse until the reply is whole.
    async fn round_trip(&mut self, cmd: &Command) -> Result<RespValue> {
        let Self {
            transport: slot,
            buf,
            config,
            ..
        } = self;
        let transport = slot.as_mut().ok_or(KvError::ConnectionClosed)?;

        transport.write(&cmd.to_bytes()).await?;

        let budget = config.timeout();
        let tick = config.socket_timeout();
        let mut idle = Duration::ZERO;
        let mut filled = 0;

        while filled < buf.len() {
            let n = transport.read(&mut buf[filled..], false).await?;
            if n == 0 {
                idle += tick;
                if idle > budget {
                    return Err(KvError::Timeout(format!(
                        "no complete reply within {budget:?}"
                    )));
                }
                continue;
            }

            filled += n;
            match parse(&buf[..filled]) {
                Ok((value, consumed)) => {
                    if consumed < filled {
                        tracing::debug!(
                            extra = filled - consumed,
                            "discarding bytes after reply"
                        );
                    }
                    return Ok(value);
                }
                Err(KvError::Incomplete) => idle = Duration::ZERO,
                Err(e) => return Err(e),
            }
        }

        // The rest of the reply is still in flight, so the stream is out of
        // step with the next request.
        tracing::warn!(capacity = buf.len(), "reply exceeds receive buffer, closing");
        if let Some(mut transport) = slot.take() {
            transport.close().await;
        }
        Err(KvError::Parameter(format!(
            "reply exceeds receive buffer of {} bytes",
            buf.len()
        )))
    }

    /// Result code of the last operation: 0 after success, negative after
    /// failure, [`FAIL`] when the socket is closed.
    pub fn error_code(&self) -> i64 {
        if self.transport.is_none() {
            return FAIL;
        }
        self.code.min(0)
    }

    /// Message of the last operation (status text or error description).
    pub fn error_string(&self) -> &str {
        &self.msg
    }

    /// Numeric status of the last reply.
    pub fn status(&self) -> i64 {
        self.status
    }

    /// Whether this connection must not be reused.
    pub fn is_broken(&self) -> bool {
        self.transport.is_none() || is_connection_code(self.code)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Sockets are registered with the shared runtime; dropping them
        // there keeps deregistration off a runtime-less thread.
        if let Some(transport) = self.transport.take() {
            if let Ok(rt) = runtime::get_runtime() {
                let _guard = rt.enter();
                drop(transport);
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
