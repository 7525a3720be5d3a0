//! coral-client: cluster-aware RESP client.
//!
//! Routes commands across a sharded key-value cluster:
//!
//! - **Slot hashing**: keys map to one of 16384 hash slots via the same
//!   CRC16 the servers use, so client routing agrees with server
//!   redirects.
//! - **Topology discovery**: the slot table is bootstrapped from any
//!   reachable seed and rebuilt when the cluster reshards.
//! - **Redirect handling**: `MOVED` patches the slot table and schedules
//!   a rebuild; `ASK` follows a live migration behind an `ASKING` marker.
//! - **Retry**: transient node failures fall back to random nodes, with
//!   at most 16 attempts per call.
//! - **Single mode**: a lone standalone seed is served directly, with
//!   routing bypassed.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use coral_client::{Cluster, PoolConfig};
//!
//! let cluster = Cluster::connect(&["127.0.0.1:7000"], PoolConfig::default()).await?;
//! let reply = cluster.call("SET", &["mykey".into(), "value".into()]).await?;
//! ```

mod cluster;
mod config;
mod connection;
mod discovery;
mod error;
mod handle;
mod pool;
mod slot;
mod state;

pub use cluster::Cluster;
pub use config::PoolConfig;
pub use error::{ClusterError, HandleError};
pub use handle::NodeHandle;
pub use slot::{key_slot, SlotRange, SLOT_COUNT};

pub use coral_protocol::{Frame, ProtocolError};
