//! Mutable cluster state: seed addresses, node handles, and the
//! slot-to-address table.
//!
//! One `ClusterState` is owned by the [`Cluster`](crate::Cluster) behind
//! a reader-writer lock. Discovery rewrites it wholesale; dispatch reads
//! it and performs targeted mutations (lazy handle creation, slot patches
//! after redirects) under short write sections.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::seq::IteratorRandom;
use tracing::debug;

use crate::config::PoolConfig;
use crate::handle::NodeHandle;

pub(crate) struct ClusterState {
    /// Addresses topology can be bootstrapped from. Seeded at
    /// construction, augmented by discovery.
    pub(crate) seeds: HashSet<String>,

    /// Live handles by address. Every address routed to gets a handle
    /// here before a command is sent.
    pub(crate) handles: HashMap<String, Arc<NodeHandle>>,

    /// Slot ownership as currently known. May be partial; slots absent
    /// here fall back to a random node.
    pub(crate) slots: HashMap<u16, String>,

    /// When set, the next dispatch rebuilds the topology before routing.
    pub(crate) refresh_pending: bool,

    /// When set, the cluster is one standalone node and routing is
    /// bypassed entirely.
    pub(crate) single_mode: bool,

    config: PoolConfig,
}

impl ClusterState {
    pub(crate) fn new(config: PoolConfig) -> Self {
        Self {
            seeds: HashSet::new(),
            handles: HashMap::new(),
            slots: HashMap::new(),
            refresh_pending: false,
            single_mode: false,
            config,
        }
    }

    /// The single lazy-creation point for handles: returns the existing
    /// handle for `addr` or inserts a new one built from the configured
    /// pool parameters.
    pub(crate) fn ensure_handle(&mut self, addr: &str) -> Arc<NodeHandle> {
        if let Some(handle) = self.handles.get(addr) {
            return handle.clone();
        }
        debug!(%addr, "opening node handle");
        let handle = Arc::new(NodeHandle::new(addr, self.config.clone()));
        self.handles.insert(addr.to_string(), handle.clone());
        handle
    }

    /// A uniformly random handle, for routing when slot ownership is
    /// unknown.
    pub(crate) fn random_handle(&self) -> Option<Arc<NodeHandle>> {
        self.handles
            .values()
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    /// The handle owning `slot` per the current table, creating it lazily;
    /// a random handle when the slot is unmapped.
    pub(crate) fn handle_for_slot(&mut self, slot: u16) -> Option<Arc<NodeHandle>> {
        match self.slots.get(&slot).cloned() {
            Some(addr) => Some(self.ensure_handle(&addr)),
            None => {
                debug!(slot, "slot unmapped, falling back to a random node");
                self.random_handle()
            }
        }
    }

    /// Any handle. In single mode this is the sole node.
    pub(crate) fn first_handle(&self) -> Option<Arc<NodeHandle>> {
        self.handles.values().next().cloned()
    }

    /// Tears down connectivity ahead of a topology rebuild: closes every
    /// handle's pool, drops the seed addresses' handle entries (discovery
    /// re-creates them), and forgets all slot assignments.
    pub(crate) async fn disconnect_all(&mut self) {
        debug!(handles = self.handles.len(), "disconnecting all handles");
        for handle in self.handles.values() {
            handle.close().await;
        }
        for seed in &self.seeds {
            self.handles.remove(seed);
        }
        self.slots.clear();
    }
}
