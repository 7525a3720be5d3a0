//! Connection pool configuration.

use std::time::Duration;

/// Parameters for each node's connection pool.
///
/// One `PoolConfig` is supplied when the cluster client is constructed
/// and applies to every node handle the client opens; it is never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of idle connections kept for reuse.
    pub max_idle: usize,

    /// Maximum number of live connections per node, idle or checked out.
    pub max_active: usize,

    /// Idle connections older than this are dropped at checkout instead
    /// of reused. Zero disables idle expiry.
    pub idle_timeout: Duration,

    /// Password sent via `AUTH` when each connection is dialed.
    pub password: Option<String>,

    /// Logical database selected via `SELECT` after dialing, when
    /// non-zero.
    pub database: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 4,
            max_active: 16,
            idle_timeout: Duration::from_secs(240),
            password: None,
            database: 0,
        }
    }
}
