//! Connection configuration and URL parsing.
//!
//! One [`ConnectionConfig`] seeds every connection a pool creates. It can be
//! built field by field (starting from [`Default`]) or parsed from a URL:
//!
//! - `redis://[user:pass@]host[:port][/db]`

use std::time::Duration;

use crate::error::{KvError, Result};

/// Default server port.
pub const DEFAULT_PORT: u16 = 6379;
/// Default connect / command timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
/// Default per-call socket idle timeout in milliseconds.
pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 10;
/// Default receive buffer capacity (2 MB).
pub const DEFAULT_BUFFER_SIZE: usize = 2 * 1024 * 1024;
/// Default pool size.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Full connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Optional username (ACL).
    pub username: Option<String>,
    /// Optional password. An empty password means "no AUTH".
    pub password: Option<String>,
    /// Database index selected after authentication.
    pub db: u16,
    /// Connect deadline and per-command response budget, in milliseconds.
    pub timeout_ms: u64,
    /// Send/receive deadline of a single socket call, in milliseconds.
    ///
    /// A receive that hits this deadline counts as "no data yet" and adds
    /// this amount to the command's idle time.
    pub socket_timeout_ms: u64,
    /// Receive buffer capacity in bytes. A reply larger than this fails.
    pub buffer_size: usize,
    /// Maximum number of live pooled connections.
    pub pool_size: usize,
    /// How long a checkout waits for a free slot before failing as busy.
    pub checkout_timeout_ms: u64,
    /// Idle connections older than this are dropped instead of reused.
    pub idle_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            db: 0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            socket_timeout_ms: DEFAULT_SOCKET_TIMEOUT_MS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            checkout_timeout_ms: DEFAULT_TIMEOUT_MS,
            idle_timeout_ms: 300_000, // 5 minutes
        }
    }
}

impl ConnectionConfig {
    /// Config pointing at `host:port` with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Parse a `redis://` URL into a ConnectionConfig.
    pub fn from_url(url: &str) -> Result<Self> {
        let mut config = Self::default();

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| KvError::Parameter(format!("invalid URL, missing ://: {url}")))?;

        if scheme != "redis" {
            return Err(KvError::Parameter(format!("unsupported URL scheme: {scheme}")));
        }

        let (host_part, db_part) = split_path(rest);

        if let Some(db_str) = db_part {
            config.db = db_str
                .parse()
                .map_err(|_| KvError::Parameter(format!("invalid db number: {db_str}")))?;
        }

        let host_port = match host_part.rsplit_once('@') {
            Some((userinfo, hp)) => {
                parse_userinfo(&mut config, userinfo);
                hp
            }
            None => host_part,
        };

        let (host, port) = parse_host_port(host_port)?;
        config.host = host;
        config.port = port;
        Ok(config)
    }

    /// Return the server address as "host:port".
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    /// Reject values no connection could work with.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(KvError::Parameter("empty host".into()));
        }
        if self.port == 0 {
            return Err(KvError::Parameter("port must be non-zero".into()));
        }
        if self.buffer_size == 0 {
            return Err(KvError::Parameter("buffer_size must be non-zero".into()));
        }
        if self.socket_timeout_ms == 0 {
            return Err(KvError::Parameter("socket_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }
}

// ── URL parsing helpers ────────────────────────────────────────────

/// Split `rest` into (before_path, Some(path)) or (rest, None).
fn split_path(rest: &str) -> (&str, Option<&str>) {
    match rest.split_once('/') {
        Some((before, after)) if !after.is_empty() => (before, Some(after)),
        Some((before, _)) => (before, None),
        None => (rest, None),
    }
}

/// Parse `user:pass`, `:pass` or a bare password into config.
fn parse_userinfo(config: &mut ConnectionConfig, userinfo: &str) {
    match userinfo.split_once(':') {
        Some((user, pass)) => {
            if !user.is_empty() {
                config.username = Some(user.to_string());
            }
            if !pass.is_empty() {
                config.password = Some(pass.to_string());
            }
        }
        None if !userinfo.is_empty() => config.password = Some(userinfo.to_string()),
        None => {}
    }
}

/// Parse `host[:port]` or `[ipv6]:port`.
fn parse_host_port(s: &str) -> Result<(String, u16)> {
    let (host, port) = if let Some(inner) = s.strip_prefix('[') {
        let close = inner
            .find(']')
            .ok_or_else(|| KvError::Parameter(format!("unclosed IPv6 bracket: {s}")))?;
        let port = match inner[close + 1..].strip_prefix(':') {
            Some(port_str) => parse_port(port_str)?,
            None => DEFAULT_PORT,
        };
        (inner[..close].to_string(), port)
    } else {
        match s.rsplit_once(':') {
            // Bare IPv6 without brackets
            Some((h, _)) if h.contains(':') => (s.to_string(), DEFAULT_PORT),
            Some((h, p)) => (h.to_string(), parse_port(p)?),
            None => (s.to_string(), DEFAULT_PORT),
        }
    };

    if host.is_empty() {
        return Ok(("127.0.0.1".to_string(), port));
    }
    Ok((host, port))
}

fn parse_port(s: &str) -> Result<u16> {
    s.parse()
        .map_err(|_| KvError::Parameter(format!("invalid port: {s}")))
}

// ── Tests ──────────────────────────────────────────────────────────
