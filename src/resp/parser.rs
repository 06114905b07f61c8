//! Incremental RESP2 parser.
//!
//! [`parse`] takes the bytes received so far and returns
//! `Ok((RespValue, bytes_consumed))`, `Err(Incomplete)` when more data is
//! needed, or `Err(Protocol(…))` on malformed input.
//!
//! The parser keeps no state between calls. When a reply arrives in pieces
//! the caller appends to its buffer and parses again from the start of the
//! message; a longer buffer always reproduces the earlier partial work.

use bytes::Bytes;
use memchr::memchr;

use crate::error::{KvError, Result};
use crate::resp::types::RespValue;

/// Arrays nested deeper than this are rejected instead of recursing further.
const MAX_DEPTH: usize = 512;

/// Parse one RESP value from the front of `buf`.
///
/// Returns `(value, bytes_consumed)` on success.
/// Returns `Err(Incomplete)` when the buffer is too short;
/// callers should read more data and retry.
pub fn parse(buf: &[u8]) -> Result<(RespValue, usize)> {
    parse_value(buf, 0)
}

/// Returns true when `buf` starts with one complete, well-formed reply.
pub fn is_complete(buf: &[u8]) -> Result<bool> {
    match parse(buf) {
        Ok(_) => Ok(true),
        Err(KvError::Incomplete) => Ok(false),
        Err(e) => Err(e),
    }
}

fn parse_value(buf: &[u8], depth: usize) -> Result<(RespValue, usize)> {
    if buf.is_empty() {
        return Err(KvError::Incomplete);
    }

    match buf[0] {
        b'+' => parse_simple_string(buf),
        b'-' => parse_simple_error(buf),
        b':' => parse_integer(buf),
        b'$' => parse_bulk_string(buf),
        b'*' => parse_array(buf, depth),
        other => Err(KvError::Protocol(format!(
            "unknown RESP type byte: 0x{other:02x}"
        ))),
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Find the next `\r\n` in `buf` starting at `offset`.
/// Returns the index of `\r`.
#[inline]
fn find_crlf(buf: &[u8], offset: usize) -> Result<usize> {
    match memchr(b'\r', &buf[offset..]) {
        Some(pos) => {
            let abs = offset + pos;
            match buf.get(abs + 1) {
                Some(b'\n') => Ok(abs),
                Some(_) => Err(KvError::Protocol("expected \\n after \\r".into())),
                None => Err(KvError::Incomplete),
            }
        }
        None => Err(KvError::Incomplete),
    }
}

/// Read the line starting at `buf[offset]` up to `\r\n`.
/// Returns `(line_bytes, index_after_crlf)`.
#[inline]
fn read_line(buf: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    let cr = find_crlf(buf, offset)?;
    Ok((&buf[offset..cr], cr + 2))
}

/// Parse an integer from a byte slice (no allocations).
fn parse_int_from_bytes(bytes: &[u8]) -> Result<i64> {
    let (negative, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        Some(_) => (false, bytes),
        None => return Err(KvError::Protocol("empty integer".into())),
    };

    if digits.is_empty() {
        return Err(KvError::Protocol("integer has no digits".into()));
    }

    // Accumulate as negative so i64::MIN fits.
    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(KvError::Protocol(format!(
                "invalid byte in integer: 0x{b:02x}"
            )));
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_sub((b - b'0') as i64))
            .ok_or_else(|| KvError::Protocol("integer overflow".into()))?;
    }

    if negative {
        Ok(n)
    } else {
        n.checked_neg()
            .ok_or_else(|| KvError::Protocol("integer overflow".into()))
    }
}

fn utf8_line(line: &[u8], what: &str) -> Result<String> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|e| KvError::Protocol(format!("invalid UTF-8 in {what}: {e}")))
}

// ── Type parsers ──────────────────────────────────────────────────

/// `+<string>\r\n`
fn parse_simple_string(buf: &[u8]) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let s = match line {
        b"OK" => "OK".to_string(),
        b"PONG" => "PONG".to_string(),
        _ => utf8_line(line, "simple string")?,
    };
    Ok((RespValue::SimpleString(s), next))
}

/// `-<error message>\r\n`
fn parse_simple_error(buf: &[u8]) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    Ok((RespValue::Error(utf8_line(line, "error")?), next))
}

/// `:<integer>\r\n`
fn parse_integer(buf: &[u8]) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let i = parse_int_from_bytes(line)?;
    Ok((RespValue::Integer(i), next))
}

/// `$<length>\r\n<data>\r\n`  or  `$-1\r\n`
fn parse_bulk_string(buf: &[u8]) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let len = parse_int_from_bytes(line)?;

    if len < 0 {
        return Ok((RespValue::Null, next));
    }

    let data_end = usize::try_from(len)
        .ok()
        .and_then(|len| next.checked_add(len))
        .ok_or_else(|| KvError::Protocol(format!("bulk length out of range: {len}")))?;
    // Need data + \r\n
    if buf.len() < data_end + 2 {
        return Err(KvError::Incomplete);
    }
    if buf[data_end] != b'\r' || buf[data_end + 1] != b'\n' {
        return Err(KvError::Protocol(
            "bulk string not terminated by \\r\\n".into(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[next..data_end]);
    Ok((RespValue::BulkString(data), data_end + 2))
}

/// `*<count>\r\n<elements>`  or  `*-1\r\n`
fn parse_array(buf: &[u8], depth: usize) -> Result<(RespValue, usize)> {
    if depth >= MAX_DEPTH {
        return Err(KvError::Protocol(format!(
            "arrays nested deeper than {MAX_DEPTH}"
        )));
    }

    let (line, mut next) = read_line(buf, 1)?;
    let count = parse_int_from_bytes(line)?;

    if count < 0 {
        return Ok((RespValue::NullArray, next));
    }

    // Don't trust the declared count for the allocation; each element is
    // at least 3 bytes so the buffer bounds what can actually be present.
    let count = count as usize;
    let mut elements = Vec::with_capacity(count.min((buf.len() - next) / 3 + 1));
    for _ in 0..count {
        let (val, consumed) = parse_value(&buf[next..], depth + 1)?;
        elements.push(val);
        next += consumed;
    }
    Ok((RespValue::Array(elements), next))
}

// ── Tests ──────────────────────────────────────────────────────────
