//! Errors produced while decoding the RESP wire format.

use thiserror::Error;

/// Errors that can occur when parsing RESP frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer doesn't hold a complete frame yet. Internal to the
    /// parser; surfaced to callers as `Ok(None)`.
    #[error("incomplete frame: need more data")]
    Incomplete,

    /// The first byte of a frame didn't match any known RESP type prefix.
    #[error("invalid type prefix: {0:#04x}")]
    InvalidPrefix(u8),

    /// A length or integer payload wasn't a valid decimal number.
    #[error("invalid integer encoding")]
    InvalidInteger,

    /// A bulk string or aggregate declared a negative length.
    #[error("invalid declared length: {0}")]
    InvalidLength(i64),

    /// A bulk string declared a length above the hard cap.
    #[error("bulk string of {0} bytes exceeds limit")]
    BulkTooLarge(usize),

    /// An array or map declared more elements than the hard cap.
    #[error("aggregate of {0} elements exceeds limit")]
    TooManyElements(usize),

    /// Arrays/maps nested deeper than the hard cap.
    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    /// A simple string or error line contained invalid UTF-8.
    #[error("invalid utf-8 in {0} line")]
    InvalidUtf8(&'static str),
}
