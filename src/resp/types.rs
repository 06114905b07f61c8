use bytes::Bytes;

/// RESP2 reply values.
///
/// The two "absent" markers are kept apart from their empty counterparts:
/// `$-1` is [`RespValue::Null`] (never an empty bulk string) and `*-1` is
/// [`RespValue::NullArray`] (never an empty array).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK\r\n
    SimpleString(String),
    /// -ERR message\r\n
    Error(String),
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n
    BulkString(Bytes),
    /// *2\r\n…
    Array(Vec<RespValue>),
    /// $-1\r\n
    Null,
    /// *-1\r\n
    NullArray,
}

impl RespValue {
    /// Either absent marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::NullArray)
    }

    /// Text form of a scalar reply, as stored in a command's result list.
    ///
    /// Bulk payloads that are not valid UTF-8 are converted lossily.
    /// Absent values and arrays have no text form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::SimpleString(s) | Self::Error(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::BulkString(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Self::Array(_) | Self::Null | Self::NullArray => None,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
