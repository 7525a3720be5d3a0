//! A handle to one storage node: its address plus a pool of reusable
//! connections.
//!
//! The handle performs no routing decisions of its own; it simply issues
//! commands and surfaces errors (including server error replies) to the
//! dispatcher.

use bytes::Bytes;
use coral_protocol::Frame;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::PoolConfig;
use crate::connection::Connection;
use crate::error::HandleError;
use crate::pool::Pool;

pub struct NodeHandle {
    addr: String,
    pool: Pool,
    /// Connection checked out by [`send`](Self::send) and awaiting a
    /// flush. The next `call` on this handle drains it.
    parked: Mutex<Option<Connection>>,
}

impl NodeHandle {
    /// Creates a handle bound to `addr` (`host:port`). No connection is
    /// dialed until the first command.
    pub fn new(addr: impl Into<String>, config: PoolConfig) -> Self {
        let addr = addr.into();
        Self {
            pool: Pool::new(addr.clone(), config),
            addr,
            parked: Mutex::new(None),
        }
    }

    /// The `host:port` this handle is bound to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Issues a command and waits for its reply.
    ///
    /// If a previous [`send`](Self::send) parked a connection here, that
    /// connection is used: the queued commands are flushed along with
    /// this one and their replies drained first, so queued commands reach
    /// the node ahead of this one on the same connection.
    ///
    /// The connection is released on every exit path: returned to the
    /// pool when healthy, dropped on transport errors.
    pub async fn call(&self, cmd: &str, args: &[Bytes]) -> Result<Frame, HandleError> {
        let mut conn = match self.parked.lock().await.take() {
            Some(conn) => conn,
            None => self.pool.get().await?,
        };

        match conn.call(cmd, args).await {
            Ok(frame) => {
                self.pool.put(conn).await;
                Ok(frame)
            }
            // the node answered; the connection itself is fine
            Err(err @ HandleError::Server(_)) => {
                self.pool.put(conn).await;
                Err(err)
            }
            Err(err) => {
                debug!(addr = %self.addr, "dropping connection: {err}");
                self.pool.discard().await;
                Err(err)
            }
        }
    }

    /// Queues a command without flushing and returns immediately.
    ///
    /// The connection is **not** released: it stays parked at this handle
    /// with the command sitting in its write buffer, so there is no
    /// delivery guarantee until something flushes it. A subsequent
    /// [`call`](Self::call) on this handle flushes the queue and drains
    /// the owed replies; otherwise the queued commands are lost when the
    /// handle closes.
    pub async fn send(&self, cmd: &str, args: &[Bytes]) -> Result<(), HandleError> {
        let mut parked = self.parked.lock().await;
        let mut conn = match parked.take() {
            Some(conn) => conn,
            None => self.pool.get().await?,
        };
        conn.enqueue(cmd, args);
        *parked = Some(conn);
        Ok(())
    }

    /// Releases every pooled connection. Best-effort: commands still
    /// queued on a parked connection are dropped with it.
    pub async fn close(&self) {
        if self.parked.lock().await.take().is_some() {
            self.pool.discard().await;
        }
        self.pool.close().await;
    }
}
