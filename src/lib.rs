//! # kadsim
//!
//! A deterministic Kademlia overlay-network construction simulator. It
//! builds a synthetic network of `n` virtual nodes over an `m`-bit
//! identifier space with `k`-sized routing-table buckets, drives every node
//! through the Kademlia join protocol against the already-joined peers, and
//! renders the resulting connectivity graph as GML for offline analysis.
//!
//! The crate is split into modules that can be reused independently:
//!
//! - [`identifier`]: fixed-width identifiers, XOR distances, and the peer
//!   records carried by routing structures.
//! - [`routing`]: k-buckets with least-recently-seen eviction and the
//!   per-node routing table with its `k`-closest retrieval.
//! - [`lookup`]: the bounded sorted working set driving an iterative lookup.
//! - [`network`]: the node arena, the simulated `PING`/`FIND_NODE` RPC
//!   surface, and the iterative lookup procedure itself.
//! - [`coordinator`]: the top-level driver joining nodes one at a time and
//!   synthesizing the bucket-refresh lookups that warm their tables.
//! - [`gml`]: the GML serializer.
//!
//! There is no transport and no concurrency: RPCs are synchronous calls
//! into the arena, nodes join strictly one after another, and a fixed RNG
//! seed reproduces a run bit for bit.
//!
//! ## Getting started
//!
//! ```
//! use kadsim::Coordinator;
//!
//! # fn main() -> kadsim::Result<()> {
//! let mut coordinator = Coordinator::with_seed(16, 32, 4, 7)?;
//! coordinator.run()?;
//!
//! let graph = kadsim::gml::render(coordinator.network());
//! assert!(graph.starts_with("graph"));
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod gml;
pub mod identifier;
pub mod lookup;
pub mod network;
pub mod routing;

pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use identifier::{Distance, Identifier, NodeRef, Peer};
pub use lookup::{DistanceNode, KClosestQueue};
pub use network::{Network, NetworkStats, Node};
pub use routing::{Bucket, PendingInsert, RoutingTable};

/// Lookup concurrency bound: a bounded round stops querying after α + 1
/// replies. The network is simulated sequentially, so the bound caps work
/// per round rather than in-flight RPCs.
pub const ALPHA: usize = 5;
