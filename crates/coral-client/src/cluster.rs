//! The cluster client: construction, public command API, and the
//! dispatch state machine.
//!
//! Dispatch resolves the command's routing key to a slot, sends the
//! command to the node currently believed to own that slot, and reacts
//! to what comes back: `MOVED` patches the slot table and schedules a
//! topology rebuild, `ASK` routes the next attempt through the migration
//! target behind an `ASKING` marker, and anything else falls back to a
//! random node. Each call makes at most [`REQUEST_TTL`] attempts.

use std::sync::Arc;

use bytes::Bytes;
use coral_protocol::Frame;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::PoolConfig;
use crate::discovery;
use crate::error::{ClusterError, HandleError};
use crate::handle::NodeHandle;
use crate::slot::{key_slot, SLOT_COUNT};
use crate::state::ClusterState;

/// Attempts per call, counted across redirects and retries.
const REQUEST_TTL: usize = 16;

/// Commands that carry no routing key and cannot be dispatched to a
/// cluster (they are node-scoped or connection-scoped).
const UNROUTABLE: [&str; 6] = ["info", "multi", "exec", "slaveof", "config", "shutdown"];

/// A cluster client shared by any number of concurrent callers.
///
/// Construct once with [`Cluster::connect`], wrap in an [`Arc`], and
/// clone the `Arc` wherever commands are issued.
pub struct Cluster {
    state: RwLock<ClusterState>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster").finish_non_exhaustive()
    }
}

impl Cluster {
    /// Connects to a cluster reachable through `seeds` (`host:port`
    /// strings).
    ///
    /// Each seed is probed for cluster capability. A single standalone
    /// seed puts the client in single mode; multiple seeds where any is
    /// standalone is a configuration error. Otherwise the slot table is
    /// bootstrapped immediately.
    pub async fn connect(seeds: &[&str], config: PoolConfig) -> Result<Self, ClusterError> {
        if seeds.is_empty() {
            return Err(ClusterError::Configuration(
                "at least one seed address is required".into(),
            ));
        }

        let mut state = ClusterState::new(config);
        for &seed in seeds {
            state.seeds.insert(seed.to_string());
            state.ensure_handle(seed);
        }

        let addrs: Vec<String> = state.seeds.iter().cloned().collect();
        for addr in addrs {
            let handle = state.ensure_handle(&addr);
            if !discovery::has_cluster_capability(&handle).await {
                if state.seeds.len() == 1 {
                    debug!(%addr, "seed is a standalone node, entering single mode");
                    state.single_mode = true;
                } else {
                    return Err(ClusterError::Configuration(
                        "multiple seed nodes given, but cluster support is disabled".into(),
                    ));
                }
            }
        }

        if !state.single_mode {
            discovery::populate_slots(&mut state).await;
        }

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Issues a command and waits for the reply.
    ///
    /// The routing key is the first element of `args`; commands that take
    /// no key cannot be dispatched (see [`ClusterError::Undispatchable`]).
    pub async fn call(&self, cmd: &str, args: &[Bytes]) -> Result<Frame, ClusterError> {
        let reply = self.dispatch(true, cmd, args).await?;
        // flush mode always produces a reply frame
        Ok(reply.unwrap_or(Frame::Null))
    }

    /// Queues a command on the owning node without waiting for a reply.
    ///
    /// Fire-and-forget: the command sits unflushed on that node's parked
    /// connection until a later [`call`](Self::call) routed to the same
    /// node flushes it, so there is no delivery guarantee.
    pub async fn send(&self, cmd: &str, args: &[Bytes]) -> Result<(), ClusterError> {
        self.dispatch(false, cmd, args).await.map(|_| ())
    }

    /// Marks the topology stale; the next dispatch rebuilds the slot
    /// table before routing.
    pub async fn set_refresh_needed(&self) {
        self.state.write().await.refresh_pending = true;
    }

    /// Resolves the handle that currently serves `key`, for callers that
    /// want to bypass dispatch (e.g. to pipeline several commands against
    /// one slot and drain the replies themselves).
    pub async fn handle_for_key(&self, key: &[u8]) -> Result<Arc<NodeHandle>, ClusterError> {
        let mut state = self.state.write().await;
        if state.single_mode {
            return state.first_handle().ok_or(ClusterError::NoHandles);
        }
        let slot = key_slot(key);
        state.handle_for_slot(slot).ok_or(ClusterError::NoHandles)
    }

    /// The dispatch state machine. `flush` selects request/response
    /// (`Some(reply)`) versus fire-and-forget (`None`).
    async fn dispatch(
        &self,
        flush: bool,
        cmd: &str,
        args: &[Bytes],
    ) -> Result<Option<Frame>, ClusterError> {
        // single-mode fast path: one node, no routing
        {
            let state = self.state.read().await;
            if state.single_mode {
                let handle = state.first_handle().ok_or(ClusterError::NoHandles)?;
                drop(state);
                return Ok(issue(&handle, flush, cmd, args).await?);
            }
        }

        // a MOVED on an earlier call scheduled a rebuild; do it now
        if self.state.read().await.refresh_pending {
            let mut state = self.state.write().await;
            if state.refresh_pending {
                debug!("topology marked stale, rebuilding before dispatch");
                state.disconnect_all().await;
                discovery::populate_slots(&mut state).await;
                state.refresh_pending = false;
            }
            if state.single_mode {
                let handle = state.first_handle().ok_or(ClusterError::NoHandles)?;
                drop(state);
                return Ok(issue(&handle, flush, cmd, args).await?);
            }
        }

        let key = routing_key(cmd, args);
        let mut ttl = REQUEST_TTL;
        let mut try_random = false;
        let mut asking = false;

        while ttl > 0 {
            ttl -= 1;

            let Some(key) = key else {
                return Err(ClusterError::Undispatchable(cmd.to_string()));
            };
            let slot = key_slot(key);

            let picked = {
                let mut state = self.state.write().await;
                if try_random {
                    try_random = false;
                    state.random_handle()
                } else {
                    state.handle_for_slot(slot)
                }
            };
            let Some(handle) = picked else {
                debug!(slot, "no handle available, giving up");
                break;
            };

            if asking {
                // queued on the same connection the command will use;
                // a failure here resurfaces on the command itself
                let _ = handle.send("ASKING", &[]).await;
                asking = false;
            }

            let err = match issue(&handle, flush, cmd, args).await {
                Ok(reply) => return Ok(reply),
                Err(e) => e,
            };

            let text = err.to_string();
            let mut tokens = text.split_whitespace();
            match tokens.next() {
                Some("MOVED") => match parse_redirect(&mut tokens) {
                    Some((moved_slot, addr)) => {
                        debug!(slot = moved_slot, %addr, ttl, "MOVED, patching slot table");
                        let mut state = self.state.write().await;
                        // authoritative re-shard: rebuild on the next
                        // call, but patch now so this one can finish
                        state.refresh_pending = true;
                        state.slots.insert(moved_slot, addr);
                    }
                    None => try_random = true,
                },
                Some("ASK") => match parse_redirect(&mut tokens) {
                    Some((ask_slot, addr)) => {
                        debug!(slot = ask_slot, %addr, ttl, "ASK, following migration");
                        asking = true;
                        let mut state = self.state.write().await;
                        state.slots.insert(ask_slot, addr);
                    }
                    None => try_random = true,
                },
                _ => {
                    debug!(ttl, "attempt failed ({text}), retrying on a random node");
                    try_random = true;
                }
            }
        }

        debug!(%cmd, "request TTL exhausted");
        Err(ClusterError::Exhausted)
    }
}

/// Issues one attempt on a handle: request/response when `flush`,
/// fire-and-forget otherwise.
async fn issue(
    handle: &NodeHandle,
    flush: bool,
    cmd: &str,
    args: &[Bytes],
) -> Result<Option<Frame>, HandleError> {
    if flush {
        handle.call(cmd, args).await.map(Some)
    } else {
        handle.send(cmd, args).await.map(|_| None)
    }
}

/// Extracts the routing key: the first element of the argument vector.
/// Commands that are node-scoped rather than key-scoped have none.
fn routing_key<'a>(cmd: &str, args: &'a [Bytes]) -> Option<&'a [u8]> {
    if UNROUTABLE.iter().any(|c| cmd.eq_ignore_ascii_case(c)) {
        return None;
    }
    args.first().map(|key| key.as_ref())
}

/// Parses the `<slot> <addr>` tail of a MOVED/ASK error.
fn parse_redirect(tokens: &mut std::str::SplitWhitespace<'_>) -> Option<(u16, String)> {
    let slot: u16 = tokens.next()?.parse().ok()?;
    let addr = tokens.next()?;
    (slot < SLOT_COUNT).then(|| (slot, addr.to_string()))
}
