//! Incremental RESP parser.
//!
//! Parses one frame per call from a byte buffer the caller fills from
//! the socket. The parse is a single pass over the input: frame values
//! are built as bytes are validated, and an under-full buffer reports
//! `Ok(None)` so the caller can read more and retry from the start.
//!
//! Declared lengths are hardened against malformed or hostile input:
//! nesting depth, element counts, and bulk sizes are all capped before
//! any allocation happens on their behalf.

use std::io::Cursor;

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::frame::Frame;

/// Maximum nesting depth for arrays and maps.
const MAX_DEPTH: usize = 64;

/// Maximum number of elements in a single array or map.
const MAX_ELEMENTS: usize = 1_048_576;

/// Maximum bulk string payload (512 MB, the conventional RESP limit).
const MAX_BULK: i64 = 512 * 1024 * 1024;

/// Cap on up-front `Vec` capacity for declared element counts. A frame
/// can declare a huge count while carrying almost no data; elements past
/// this cap grow the vector organically instead.
const PREALLOC_LIMIT: usize = 1024;

/// Tries to parse one complete frame from the front of `buf`.
///
/// Returns `Ok(Some((frame, consumed)))` when a frame was parsed
/// (`consumed` bytes should be dropped from the buffer), `Ok(None)` when
/// the buffer doesn't contain a full frame yet, and `Err(..)` when the
/// input is malformed.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut cur = Cursor::new(buf);
    match frame(&mut cur, 0) {
        Ok(f) => Ok(Some((f, cur.position() as usize))),
        Err(ProtocolError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

fn frame(cur: &mut Cursor<&[u8]>, depth: usize) -> Result<Frame, ProtocolError> {
    match next_byte(cur)? {
        b'+' => Ok(Frame::Simple(utf8_line(cur, "simple string")?)),
        b'-' => Ok(Frame::Error(utf8_line(cur, "error")?)),
        b':' => Ok(Frame::Integer(integer_line(cur)?)),
        b'$' => bulk(cur),
        b'*' => {
            let n = aggregate_len(cur)?;
            let mut items = Vec::with_capacity(n.min(PREALLOC_LIMIT));
            for _ in 0..n {
                items.push(nested(cur, depth)?);
            }
            Ok(Frame::Array(items))
        }
        b'_' => {
            line(cur)?;
            Ok(Frame::Null)
        }
        b'%' => {
            let n = aggregate_len(cur)?;
            let mut pairs = Vec::with_capacity(n.min(PREALLOC_LIMIT));
            for _ in 0..n {
                let key = nested(cur, depth)?;
                let val = nested(cur, depth)?;
                pairs.push((key, val));
            }
            Ok(Frame::Map(pairs))
        }
        other => Err(ProtocolError::InvalidPrefix(other)),
    }
}

/// Recurses into an aggregate element, enforcing the depth cap.
fn nested(cur: &mut Cursor<&[u8]>, depth: usize) -> Result<Frame, ProtocolError> {
    if depth + 1 > MAX_DEPTH {
        return Err(ProtocolError::NestingTooDeep(MAX_DEPTH));
    }
    frame(cur, depth + 1)
}

fn bulk(cur: &mut Cursor<&[u8]>) -> Result<Frame, ProtocolError> {
    let len = integer_line(cur)?;
    if len < 0 {
        return Err(ProtocolError::InvalidLength(len));
    }
    if len > MAX_BULK {
        return Err(ProtocolError::BulkTooLarge(len as usize));
    }
    let len = len as usize;

    let start = cur.position() as usize;
    let buf = *cur.get_ref();
    // payload plus trailing \r\n must be present
    if buf.len().saturating_sub(start) < len + 2 {
        return Err(ProtocolError::Incomplete);
    }
    if buf[start + len] != b'\r' || buf[start + len + 1] != b'\n' {
        return Err(ProtocolError::InvalidLength(len as i64));
    }
    cur.set_position((start + len + 2) as u64);
    Ok(Frame::Bulk(Bytes::copy_from_slice(&buf[start..start + len])))
}

/// Reads an aggregate element count, validating sign and cap.
fn aggregate_len(cur: &mut Cursor<&[u8]>) -> Result<usize, ProtocolError> {
    let n = integer_line(cur)?;
    if n < 0 {
        return Err(ProtocolError::InvalidLength(n));
    }
    if n as usize > MAX_ELEMENTS {
        return Err(ProtocolError::TooManyElements(n as usize));
    }
    Ok(n as usize)
}

fn next_byte(cur: &mut Cursor<&[u8]>) -> Result<u8, ProtocolError> {
    let pos = cur.position() as usize;
    let buf = *cur.get_ref();
    if pos >= buf.len() {
        return Err(ProtocolError::Incomplete);
    }
    cur.set_position((pos + 1) as u64);
    Ok(buf[pos])
}

/// Returns the bytes up to the next `\r\n` and advances past it.
fn line<'a>(cur: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let buf = *cur.get_ref();
    let start = cur.position() as usize;

    // memchr scans for \r; a bare \r without \n is protocol data we
    // step over and keep scanning.
    let mut from = start;
    while let Some(offset) = memchr::memchr(b'\r', &buf[from..]) {
        let at = from + offset;
        if at + 1 < buf.len() && buf[at + 1] == b'\n' {
            cur.set_position((at + 2) as u64);
            return Ok(&buf[start..at]);
        }
        from = at + 1;
    }
    Err(ProtocolError::Incomplete)
}

fn utf8_line(cur: &mut Cursor<&[u8]>, what: &'static str) -> Result<String, ProtocolError> {
    let raw = line(cur)?;
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8(what))
}

fn integer_line(cur: &mut Cursor<&[u8]>) -> Result<i64, ProtocolError> {
    let raw = line(cur)?;
    decimal_i64(raw)
}

/// Parses an i64 from ASCII decimal without allocating. Negative values
/// accumulate downward so `i64::MIN` parses without overflow.
fn decimal_i64(raw: &[u8]) -> Result<i64, ProtocolError> {
    let (negative, digits) = match raw.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, raw),
    };
    if digits.is_empty() {
        return Err(ProtocolError::InvalidInteger);
    }

    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ProtocolError::InvalidInteger);
        }
        let d = (b - b'0') as i64;
        n = n
            .checked_mul(10)
            .and_then(|n| if negative { n.checked_sub(d) } else { n.checked_add(d) })
            .ok_or(ProtocolError::InvalidInteger)?;
    }
    Ok(n)
}
