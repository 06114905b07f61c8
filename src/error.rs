use std::fmt;
use std::io;

// ── Result codes ───────────────────────────────────────────────────
//
//  Every failure carries a stable negative code so callers that only
//  look at numbers (shell front ends, FFI shims) can branch on it.
//  Non-negative values signal success.

/// Generic success code for scalar replies.
pub const OK: i64 = 1;
/// Server replied with `-ERR …`.
pub const FAIL: i64 = -1;
pub const IOERR: i64 = -2;
pub const SYSERR: i64 = -3;
pub const NETERR: i64 = -4;
pub const TIMEOUT: i64 = -5;
pub const DATAERR: i64 = -6;
pub const SYSBUSY: i64 = -7;
pub const PARAMERR: i64 = -8;
pub const NOTFOUND: i64 = -9;
pub const NETCLOSE: i64 = -10;
pub const AUTHFAIL: i64 = -12;

/// Structured server error kinds for programmatic matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// Generic ERR
    Err,
    /// WRONGTYPE Operation against a key holding the wrong kind of value
    WrongType,
    /// NOSCRIPT No matching script
    NoScript,
    /// BUSY server is busy running a script
    Busy,
    /// LOADING dataset is being loaded in memory
    Loading,
    /// READONLY You can't write against a read only replica
    ReadOnly,
    /// NOAUTH / WRONGPASS
    Auth,
    /// Any other error prefix
    Other(String),
}

impl ServerErrorKind {
    /// Classify a server error message (e.g. "WRONGTYPE Operation against…").
    pub fn from_error_msg(msg: &str) -> Self {
        if msg.starts_with("WRONGTYPE") {
            Self::WrongType
        } else if msg.starts_with("NOSCRIPT") {
            Self::NoScript
        } else if msg.starts_with("BUSY") {
            Self::Busy
        } else if msg.starts_with("LOADING") {
            Self::Loading
        } else if msg.starts_with("READONLY") {
            Self::ReadOnly
        } else if msg.starts_with("NOAUTH") || msg.starts_with("WRONGPASS") {
            Self::Auth
        } else if msg.starts_with("ERR") {
            Self::Err
        } else {
            let prefix = msg.split_whitespace().next().unwrap_or("UNKNOWN");
            Self::Other(prefix.to_string())
        }
    }
}

/// All error variants for kvlink.
#[derive(Debug)]
pub enum KvError {
    /// The server answered with an error reply.
    Server {
        kind: ServerErrorKind,
        message: String,
    },
    /// Local I/O failure that is not a send/receive on the wire.
    Io(io::Error),
    /// Resource exhaustion or runtime failure.
    System(String),
    /// Send/receive or connect failure not classified as timeout or close.
    Network(io::Error),
    /// Operation exceeded its deadline.
    Timeout(String),
    /// Malformed protocol bytes.
    Protocol(String),
    /// RESP parser needs more data. Control flow only, never surfaced to callers.
    Incomplete,
    /// No pool slot became available in time.
    Busy(String),
    /// Malformed or oversized input, arguments or configuration.
    Parameter(String),
    /// Requested element is absent (nil reply).
    NotFound,
    /// Peer closed the connection mid-read.
    ConnectionClosed,
    /// Credential rejected by the server.
    AuthFailed(String),
}

impl KvError {
    /// Create a server error from a raw error message, auto-parsing the kind.
    pub fn server(msg: impl Into<String>) -> Self {
        let message = msg.into();
        let kind = ServerErrorKind::from_error_msg(&message);
        Self::Server { kind, message }
    }

    /// Numeric result code for this error.
    pub fn code(&self) -> i64 {
        match self {
            Self::Server { .. } => FAIL,
            Self::Io(_) => IOERR,
            Self::System(_) => SYSERR,
            Self::Network(_) => NETERR,
            Self::Timeout(_) => TIMEOUT,
            Self::Protocol(_) | Self::Incomplete => DATAERR,
            Self::Busy(_) => SYSBUSY,
            Self::Parameter(_) => PARAMERR,
            Self::NotFound => NOTFOUND,
            Self::ConnectionClosed => NETCLOSE,
            Self::AuthFailed(_) => AUTHFAIL,
        }
    }

    /// Whether the connection that produced this error can no longer be trusted.
    ///
    /// A pooled connection that reports one of these is evicted instead of
    /// being handed out again.
    pub fn is_connection_error(&self) -> bool {
        is_connection_code(self.code())
    }
}

/// Whether a numeric result code denotes a connection-level failure.
pub fn is_connection_code(code: i64) -> bool {
    matches!(code, IOERR | NETERR | TIMEOUT | DATAERR | NETCLOSE)
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server { message, .. } => write!(f, "server error: {message}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::System(msg) => write!(f, "system error: {msg}"),
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Incomplete => write!(f, "incomplete RESP message"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::Parameter(msg) => write!(f, "parameter error: {msg}"),
            Self::NotFound => write!(f, "element not found"),
            Self::ConnectionClosed => write!(f, "connection closed by server"),
            Self::AuthFailed(msg) => write!(f, "authentication failed: {msg}"),
        }
    }
}

impl std::error::Error for KvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for KvError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, KvError>;

// ── Tests ──────────────────────────────────────────────────────────
