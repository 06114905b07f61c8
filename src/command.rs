//! A single request and the reply metadata it collects.
//!
//! A [`Command`] is an append-only list of string arguments. Executing it on
//! a [`Connection`](crate::connection::Connection) fills in a status, a
//! human-readable message and the flat list of returned strings; those
//! fields are cleared at the start of every execution attempt.

use crate::error::{KvError, Result, OK};
use crate::resp::types::RespValue;
use crate::resp::writer::encode_command;

#[derive(Debug, Clone, Default)]
pub struct Command {
    args: Vec<String>,
    status: i64,
    msg: String,
    results: Vec<String>,
    reply: Option<RespValue>,
}

impl Command {
    /// Start a command with its name (`GET`, `SET`, …).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            args: vec![name.into()],
            ..Self::default()
        }
    }

    /// Build a command from an argv-like list.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Append one argument in its canonical string form (builder style).
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Append one argument in its canonical string form.
    pub fn add(&mut self, value: impl ToString) -> &mut Self {
        self.args.push(value.to_string());
        self
    }

    /// Append every item of `values`.
    pub fn add_all<I, T>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.args.extend(values.into_iter().map(|v| v.to_string()));
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Wire encoding of the request.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_command(&self.args)
    }

    /// Numeric status of the last reply: the integer for `:` replies,
    /// [`OK`] for status replies, 0 before any reply.
    pub fn status(&self) -> i64 {
        self.status
    }

    /// Status text, server error text, or a description of the failure.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Strings returned by the last reply, flattened depth-first.
    pub fn results(&self) -> &[String] {
        &self.results
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.results.get(idx).map(String::as_str)
    }

    pub fn into_results(self) -> Vec<String> {
        self.results
    }

    /// The full parsed reply, including absent markers and nesting.
    pub fn reply(&self) -> Option<&RespValue> {
        self.reply.as_ref()
    }

    pub(crate) fn reset(&mut self) {
        self.status = 0;
        self.msg.clear();
        self.results.clear();
        self.reply = None;
    }

    pub(crate) fn set_message(&mut self, msg: impl Into<String>) {
        self.msg = msg.into();
    }

    /// Record a complete reply and turn it into a result code.
    ///
    /// Arrays yield their element count, scalars [`OK`]. An error reply
    /// becomes [`KvError::Server`] and an absent bulk string
    /// [`KvError::NotFound`].
    pub(crate) fn absorb(&mut self, value: RespValue) -> Result<i64> {
        let outcome = match &value {
            RespValue::SimpleString(s) => {
                self.status = OK;
                self.msg = s.clone();
                Ok(OK)
            }
            RespValue::Error(s) => {
                self.msg = s.clone();
                Err(KvError::server(s.as_str()))
            }
            RespValue::Integer(n) => {
                self.status = *n;
                self.msg = n.to_string();
                Ok(OK)
            }
            RespValue::BulkString(_) => {
                self.results.extend(value.to_text());
                Ok(OK)
            }
            RespValue::Null => Err(KvError::NotFound),
            RespValue::Array(items) => {
                flatten_into(items, &mut self.results);
                Ok(items.len() as i64)
            }
            RespValue::NullArray => Ok(0),
        };
        self.reply = Some(value);
        outcome
    }
}

/// Depth-first walk collecting the text of every scalar element.
/// Absent elements contribute nothing.
fn flatten_into(items: &[RespValue], out: &mut Vec<String>) {
    for item in items {
        match item {
            RespValue::Array(inner) => flatten_into(inner, out),
            other => out.extend(other.to_text()),
        }
    }
}

/// Build a [`Command`] from a list of arguments.
///
/// Usage:
/// ```
/// let cmd = kvlink::cmd!("SETEX", "mykey", 30, "value");
/// assert_eq!(cmd.args(), ["SETEX", "mykey", "30", "value"]);
/// ```
#[macro_export]
macro_rules! cmd {
    ($($arg:expr),+ $(,)?) => {{
        let mut cmd = $crate::command::Command::default();
        $(cmd.add($arg);)+
        cmd
    }};
}

// ── Tests ──────────────────────────────────────────────────────────
