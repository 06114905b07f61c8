//! RESP serializer.
//!
//! Requests are encoded as an array of bulk strings:
//! `*<N>\r\n$<len>\r\narg1\r\n$<len>\r\narg2\r\n…`
//!
//! [`encode_value`] writes any [`RespValue`] in reply form, which is what a
//! server (or a test double standing in for one) sends back.

use itoa::Buffer;

use crate::resp::types::RespValue;

/// Encode a command (list of arguments) into RESP wire format.
///
/// Each argument is treated as a binary-safe bulk string.
///
/// # Example
/// ```
/// let bytes = kvlink::resp::encode_command(&["SET", "key", "value"]);
/// assert_eq!(bytes, b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n");
/// ```
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    // Pre-calculate capacity for zero (or minimal) reallocation
    let mut cap = 1 + 20 + 2; // '*' + max_digits(usize) + \r\n
    for arg in args {
        cap += 1 + 20 + 2 + arg.as_ref().len() + 2; // '$' + len + \r\n + data + \r\n
    }

    let mut buf = Vec::with_capacity(cap);
    let mut itoa_buf = Buffer::new();

    // *<N>\r\n
    buf.push(b'*');
    buf.extend_from_slice(itoa_buf.format(args.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");

    for arg in args {
        write_bulk(&mut buf, &mut itoa_buf, arg.as_ref());
    }

    buf
}

/// Append the reply encoding of `value` to `out`.
pub fn encode_value(value: &RespValue, out: &mut Vec<u8>) {
    let mut itoa_buf = Buffer::new();
    write_value(value, out, &mut itoa_buf);
}

fn write_value(value: &RespValue, out: &mut Vec<u8>, itoa_buf: &mut Buffer) {
    match value {
        RespValue::SimpleString(s) => write_line(out, b'+', s.as_bytes()),
        RespValue::Error(s) => write_line(out, b'-', s.as_bytes()),
        RespValue::Integer(i) => write_line(out, b':', itoa_buf.format(*i).as_bytes()),
        RespValue::BulkString(b) => write_bulk(out, itoa_buf, b),
        RespValue::Null => out.extend_from_slice(b"$-1\r\n"),
        RespValue::NullArray => out.extend_from_slice(b"*-1\r\n"),
        RespValue::Array(items) => {
            write_line(out, b'*', itoa_buf.format(items.len()).as_bytes());
            for item in items {
                write_value(item, out, itoa_buf);
            }
        }
    }
}

#[inline]
fn write_line(out: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    out.push(prefix);
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
}

/// `$<len>\r\n<data>\r\n`
#[inline]
fn write_bulk(out: &mut Vec<u8>, itoa_buf: &mut Buffer, data: &[u8]) {
    out.push(b'$');
    out.extend_from_slice(itoa_buf.format(data.len()).as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

// ── Tests ──────────────────────────────────────────────────────────
