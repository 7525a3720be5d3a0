//! Bounded per-node connection pool.
//!
//! Checkout prefers the most recently returned idle connection, dropping
//! any that have sat idle past the configured timeout. When every slot up
//! to `max_active` is in use, checkout retries a few times with a short
//! pause before surfacing the pool's error.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::PoolConfig;
use crate::connection::Connection;
use crate::error::HandleError;

/// Checkout attempts before the pool's error is surfaced.
const ACQUIRE_ATTEMPTS: usize = 6;

/// Pause between checkout attempts.
const ACQUIRE_PAUSE: Duration = Duration::from_millis(10);

pub(crate) struct Pool {
    addr: String,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

struct PoolState {
    idle: VecDeque<IdleConn>,
    /// Live connections, idle or checked out.
    active: usize,
    closed: bool,
}

struct IdleConn {
    conn: Connection,
    since: Instant,
}

impl Pool {
    pub(crate) fn new(addr: String, config: PoolConfig) -> Self {
        Self {
            addr,
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                active: 0,
                closed: false,
            }),
        }
    }

    /// Checks out a connection, retrying up to [`ACQUIRE_ATTEMPTS`] times
    /// with a [`ACQUIRE_PAUSE`] pause between attempts.
    pub(crate) async fn get(&self) -> Result<Connection, HandleError> {
        let mut last = None;
        for attempt in 0..ACQUIRE_ATTEMPTS {
            match self.checkout().await {
                Ok(conn) => return Ok(conn),
                // a closed pool never recovers, don't spin on it
                Err(e @ HandleError::PoolClosed) => return Err(e),
                Err(e) => last = Some(e),
            }
            if attempt + 1 < ACQUIRE_ATTEMPTS {
                tokio::time::sleep(ACQUIRE_PAUSE).await;
            }
        }
        Err(last.unwrap_or(HandleError::PoolExhausted))
    }

    async fn checkout(&self) -> Result<Connection, HandleError> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(HandleError::PoolClosed);
            }

            // freshest first; once the front is stale the rest are staler
            while let Some(idle) = state.idle.pop_front() {
                if self.config.idle_timeout.is_zero()
                    || idle.since.elapsed() < self.config.idle_timeout
                {
                    return Ok(idle.conn);
                }
                state.active -= 1;
            }

            if state.active >= self.config.max_active {
                return Err(HandleError::PoolExhausted);
            }
            state.active += 1;
        }

        // dial outside the lock; the reserved slot is given back on failure
        match Connection::dial(&self.addr, &self.config).await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                debug!(addr = %self.addr, "dial failed: {e}");
                self.state.lock().await.active -= 1;
                Err(e)
            }
        }
    }

    /// Returns a healthy connection for reuse. Dropped instead when the
    /// pool is closed or already holds `max_idle` idle connections.
    pub(crate) async fn put(&self, conn: Connection) {
        let mut state = self.state.lock().await;
        if state.closed || state.idle.len() >= self.config.max_idle {
            state.active = state.active.saturating_sub(1);
            return;
        }
        state.idle.push_front(IdleConn {
            conn,
            since: Instant::now(),
        });
    }

    /// Forgets a checked-out connection that went bad. The caller drops
    /// the connection itself; this only releases its slot.
    pub(crate) async fn discard(&self) {
        let mut state = self.state.lock().await;
        state.active = state.active.saturating_sub(1);
    }

    /// Closes the pool: drops all idle connections and refuses further
    /// checkouts.
    pub(crate) async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        let drained = state.idle.len();
        state.idle.clear();
        state.active = state.active.saturating_sub(drained);
    }
}
