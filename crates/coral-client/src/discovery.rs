//! Topology discovery.
//!
//! Bootstraps the slot table from whichever seed responds first to a
//! `CLUSTER NODES` query, and detects the degenerate case where the
//! "cluster" is a single standalone node.

use bytes::Bytes;
use coral_protocol::Frame;
use tracing::debug;

use crate::error::HandleError;
use crate::handle::NodeHandle;
use crate::slot::SlotRange;
use crate::state::ClusterState;

/// Standalone nodes reply to a cluster probe with one of these, verbatim.
const CLUSTER_DISABLED: &str = "ERR This instance has cluster support disabled";
const CLUSTER_UNKNOWN: &str = "ERR unknown command 'CLUSTER'";

/// Probes whether a node speaks the cluster protocol.
///
/// Only the two literal standalone error replies mean "no". Anything
/// else — success, a timeout, an unrelated error — is treated as
/// cluster-capable; dispatch will sort out nodes that are merely
/// unhealthy.
pub(crate) async fn has_cluster_capability(handle: &NodeHandle) -> bool {
    match handle.call("CLUSTER", &[Bytes::from_static(b"INFO")]).await {
        Err(HandleError::Server(msg)) => msg != CLUSTER_DISABLED && msg != CLUSTER_UNKNOWN,
        _ => true,
    }
}

/// Rebuilds the slot table from the first seed that answers a
/// `CLUSTER NODES` query.
///
/// Addresses found in the topology join the seed set and get handles;
/// on total failure the slot table is left as-is. Either way, every
/// seed holds a live handle when this returns.
pub(crate) async fn populate_slots(state: &mut ClusterState) {
    if state.single_mode {
        return;
    }
    debug!(seeds = state.seeds.len(), "populating slot table");

    let seeds: Vec<String> = state.seeds.iter().cloned().collect();
    for seed in &seeds {
        let handle = state.ensure_handle(seed);
        match handle.call("CLUSTER", &[Bytes::from_static(b"NODES")]).await {
            Ok(reply) => {
                if let Some(text) = topology_text(&reply) {
                    apply_topology(state, seed, &text);
                    break;
                }
                debug!(%seed, "unusable topology reply, trying next seed");
            }
            Err(e) => {
                debug!(%seed, "topology query failed: {e}");
            }
        }
    }

    // discovery may have widened the seed set; every seed keeps a handle
    let seeds: Vec<String> = state.seeds.iter().cloned().collect();
    for seed in seeds {
        state.ensure_handle(&seed);
    }

    maybe_downgrade_to_single(state).await;
}

/// Applies one `CLUSTER NODES` reply to the state.
///
/// Records are newline-separated and whitespace-tokenized. Per record:
/// `fields[1]` is the advertised `host:port` (the sentinel `:0` means
/// the node is reporting itself, so the queried seed's address is
/// substituted; newer servers append `@busport`, which is stripped), and
/// `fields[8..]` are slot descriptors — `A-B` ranges or bare slots,
/// with `[`-prefixed migration markers ignored.
pub(crate) fn apply_topology(state: &mut ClusterState, queried: &str, text: &str) {
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }

        let advertised = if fields[1] == ":0" { queried } else { fields[1] };
        let addr = match advertised.split_once('@') {
            Some((client, _bus)) => client,
            None => advertised,
        };

        if !state.seeds.contains(addr) {
            debug!(%addr, "discovered node");
            state.seeds.insert(addr.to_string());
        }
        state.ensure_handle(addr);

        if fields.len() <= 8 {
            continue;
        }
        for descriptor in &fields[8..] {
            if descriptor.starts_with('[') {
                continue;
            }
            let Some(range) = parse_slot_descriptor(descriptor) else {
                debug!(%descriptor, "skipping malformed slot descriptor");
                continue;
            };
            for slot in range.iter() {
                state.slots.insert(slot, addr.to_string());
            }
        }
    }
    debug!(
        slots = state.slots.len(),
        handles = state.handles.len(),
        seeds = state.seeds.len(),
        "topology applied"
    );
}

/// Parses a slot descriptor: an inclusive range `A-B` or a bare slot `A`.
fn parse_slot_descriptor(descriptor: &str) -> Option<SlotRange> {
    match descriptor.split_once('-') {
        Some((start, end)) => SlotRange::try_new(start.parse().ok()?, end.parse().ok()?),
        None => SlotRange::single(descriptor.parse().ok()?),
    }
}

/// Detects the standalone case a cluster client can still serve: exactly
/// one seed that owns no slots and turns out not to speak the cluster
/// protocol (e.g. it wasn't up when the client was constructed).
pub(crate) async fn maybe_downgrade_to_single(state: &mut ClusterState) {
    if state.seeds.len() != 1 || !state.slots.is_empty() || state.handles.len() != 1 {
        return;
    }
    let Some(handle) = state.first_handle() else {
        return;
    };
    if !has_cluster_capability(&handle).await {
        debug!("sole seed is a standalone node, entering single mode");
        state.single_mode = true;
    }
}

/// Extracts the text body of a topology reply.
fn topology_text(reply: &Frame) -> Option<String> {
    match reply {
        Frame::Bulk(data) => Some(String::from_utf8_lossy(data).into_owned()),
        Frame::Simple(s) => Some(s.clone()),
        _ => None,
    }
}
