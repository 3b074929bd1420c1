//! Shard routing for a horizontally partitioned relational store.
//!
//! Keys are routed with `hash(key) mod numServers` into an externally
//! maintained bucket table, and the whole table can be swapped at runtime:
//!
//! - [`ShardTopology`] is the wire form published in the coordination store.
//! - [`ShardMap`] is an immutable snapshot of buckets and open connections.
//! - [`ShardRouter`] owns the current snapshot, resolves keys and runs
//!   scatter-gather lookups when no shard key is known.
//! - [`TopologyWatcher`] follows the coordination store and drives
//!   [`ShardRouter::reconfigure`].

pub mod connector;
pub mod coordination;
pub mod error;
pub mod etcd;
pub mod hash;
pub mod map;
pub mod router;
pub mod topology;
pub mod watcher;

pub use connector::{MemoryConnector, PgConnector, ShardConnector};
pub use coordination::{CoordinationStore, InMemoryCoordinationStore, WatchEvent, WatchStream};
pub use error::{Result, ShardError};
pub use etcd::EtcdCoordinationStore;
pub use hash::fnv1_32;
pub use map::ShardMap;
pub use router::ShardRouter;
pub use topology::ShardTopology;
pub use watcher::{TopologyWatcher, TopologyWatcherHandle};
