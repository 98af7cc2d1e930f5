//! The per-lookup working set: a bounded sorted queue of candidate peers.
//!
//! A [`KClosestQueue`] lives for exactly one lookup. It keeps the `k`
//! closest peers to the lookup target seen so far, sorted by XOR distance,
//! together with a provenance map recording through which peers each
//! candidate was discovered. When a candidate is later queried, its
//! provenance set is handed to the callee so every hop along the discovery
//! path earns a slot in the callee's routing table.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::identifier::{Distance, Identifier, NodeRef, Peer};

/// A peer paired with its precomputed XOR distance to a lookup target.
///
/// Ordering is by distance. Distances are injective in the peer identifier
/// for a fixed target, so the order is total and duplicate-free without a
/// tiebreak. Comparing entries built against different targets is a
/// programming error and panics.
#[derive(Debug, Clone, Copy)]
pub struct DistanceNode {
    peer: Peer,
    target: Identifier,
    distance: Distance,
}

impl DistanceNode {
    pub fn new(peer: Peer, target: &Identifier) -> Self {
        Self {
            peer,
            target: *target,
            distance: peer.id.distance(target),
        }
    }

    pub fn peer(&self) -> Peer {
        self.peer
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }
}

impl PartialEq for DistanceNode {
    fn eq(&self, other: &Self) -> bool {
        self.peer.id == other.peer.id && self.target == other.target
    }
}

impl Eq for DistanceNode {}

impl Ord for DistanceNode {
    fn cmp(&self, other: &Self) -> Ordering {
        assert_eq!(
            self.target, other.target,
            "distance nodes are only comparable against the same target"
        );
        self.distance.cmp(&other.distance)
    }
}

impl PartialOrd for DistanceNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded sorted set of the `k` closest peers to a fixed target.
pub struct KClosestQueue {
    k: usize,
    target: Identifier,
    queue: BTreeSet<DistanceNode>,
    provenance: HashMap<NodeRef, BTreeSet<NodeRef>>,
}

impl KClosestQueue {
    /// Start a queue holding only `bootstrap`, reachable through `origin`.
    pub fn new(bootstrap: Peer, target: Identifier, k: usize, origin: NodeRef) -> Self {
        assert!(k > 0, "queue bound must be at least 1");
        let mut queue = BTreeSet::new();
        queue.insert(DistanceNode::new(bootstrap, &target));
        let mut provenance = HashMap::new();
        provenance.insert(bootstrap.node, BTreeSet::from([origin]));
        Self {
            k,
            target,
            queue,
            provenance,
        }
    }

    /// Offer a newly discovered peer, credited to the peer that returned it.
    ///
    /// Returns `false` if the peer is already queued. Otherwise the peer is
    /// inserted in distance order, its provenance becomes the provenance of
    /// `queried` plus `queried` itself, and the farthest entries are dropped
    /// until the bound holds again. Dropped entries keep their provenance
    /// row: they may still be queried later and must credit their path.
    pub fn try_add(&mut self, peer: Peer, queried: NodeRef) -> bool {
        if !self.queue.insert(DistanceNode::new(peer, &self.target)) {
            return false;
        }

        let mut traversed = self.provenance.get(&queried).cloned().unwrap_or_default();
        traversed.insert(queried);
        self.provenance.insert(peer.node, traversed);

        while self.queue.len() > self.k {
            self.queue.pop_last();
        }
        true
    }

    /// The queued peer closest to the target.
    pub fn closest(&self) -> Peer {
        self.queue
            .first()
            .expect("queue holds at least the bootstrap peer")
            .peer
    }

    /// The peers traversed to discover `node`, if it was ever offered.
    pub fn traversed(&self, node: NodeRef) -> Option<&BTreeSet<NodeRef>> {
        self.provenance.get(&node)
    }

    /// Queued peers in ascending distance order at this moment.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.queue.iter().map(|entry| entry.peer).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn target(&self) -> &Identifier {
        &self.target
    }
}
