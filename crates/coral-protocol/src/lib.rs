//! coral-protocol: RESP wire codec.
//!
//! The client side of the RESP protocol: a [`Frame`] value type, a
//! serializer that writes frames into a `BytesMut`, and an incremental
//! parser that consumes frames from a read buffer.
//!
//! The parser is synchronous and buffer-oriented. The connection layer
//! reads from the socket into a buffer and calls [`parse_frame`] until it
//! yields a complete frame; `Ok(None)` means more data is needed.

mod error;
mod frame;
mod parse;

pub use error::ProtocolError;
pub use frame::Frame;
pub use parse::parse_frame;
