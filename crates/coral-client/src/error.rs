//! Error types for node handles and cluster dispatch.

use coral_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by a single node handle.
///
/// `Server` carries the node's error reply verbatim: its `Display` output
/// is the raw message, so callers can inspect the first whitespace token
/// for redirect signals (`MOVED` / `ASK`) and compare against literal
/// server error strings.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error reply from the node, verbatim.
    #[error("{0}")]
    Server(String),

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("server closed the connection")]
    Disconnected,
}

/// Errors surfaced by cluster-level dispatch.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The command has no routing key, so there is no node to send it to.
    #[error("no way to dispatch command {0:?} to the cluster")]
    Undispatchable(String),

    /// Every attempt within the request TTL failed.
    #[error("could not complete command")]
    Exhausted,

    /// No node handle is available to serve the request.
    #[error("no node handle available")]
    NoHandles,

    /// The client was constructed with an unusable seed set.
    #[error("invalid cluster configuration: {0}")]
    Configuration(String),

    /// A node-level error passed through unmodified (single mode and
    /// direct handle access).
    #[error(transparent)]
    Handle(#[from] HandleError),
}
