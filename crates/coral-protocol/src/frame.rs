//! RESP frame values and serialization.
//!
//! [`Frame`] covers the protocol types a client exchanges with a
//! cluster node: status strings, errors, integers, bulk data, arrays,
//! null, and maps. Bulk payloads use `Bytes` so frames can be cloned
//! and moved around without copying the data.

use bytes::{BufMut, Bytes, BytesMut};

/// A single RESP protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Status reply, e.g. `+OK\r\n`.
    Simple(String),

    /// Error reply, e.g. `-MOVED 3999 127.0.0.1:6381\r\n`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Binary-safe bulk string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Array of frames, e.g. `*2\r\n+a\r\n+b\r\n`.
    Array(Vec<Frame>),

    /// Null, e.g. `_\r\n`.
    Null,

    /// Map of key-value pairs, e.g. `%1\r\n+key\r\n+val\r\n`.
    Map(Vec<(Frame, Frame)>),
}

impl Frame {
    /// Builds the standard client request form: an array of bulk strings
    /// holding the command name followed by its arguments.
    pub fn command(cmd: &str, args: &[Bytes]) -> Frame {
        let mut parts = Vec::with_capacity(1 + args.len());
        parts.push(Frame::Bulk(Bytes::copy_from_slice(cmd.as_bytes())));
        parts.extend(args.iter().map(|a| Frame::Bulk(a.clone())));
        Frame::Array(parts)
    }

    /// Returns `true` if this frame is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Serializes this frame into `dst`, including the type prefix and
    /// trailing `\r\n` delimiters.
    pub fn serialize(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                dst.put_slice(s.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Error(msg) => {
                dst.put_u8(b'-');
                dst.put_slice(msg.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                dst.put_u8(b':');
                put_i64(*n, dst);
                dst.put_slice(b"\r\n");
            }
            Frame::Bulk(data) => {
                dst.put_u8(b'$');
                put_i64(data.len() as i64, dst);
                dst.put_slice(b"\r\n");
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Frame::Array(items) => {
                dst.put_u8(b'*');
                put_i64(items.len() as i64, dst);
                dst.put_slice(b"\r\n");
                for item in items {
                    item.serialize(dst);
                }
            }
            Frame::Null => {
                dst.put_slice(b"_\r\n");
            }
            Frame::Map(pairs) => {
                dst.put_u8(b'%');
                put_i64(pairs.len() as i64, dst);
                dst.put_slice(b"\r\n");
                for (key, val) in pairs {
                    key.serialize(dst);
                    val.serialize(dst);
                }
            }
        }
    }
}

/// Writes an i64 as decimal ASCII without allocating.
fn put_i64(val: i64, dst: &mut BytesMut) {
    let mut buf = itoa::Buffer::new();
    dst.put_slice(buf.format(val).as_bytes());
}
