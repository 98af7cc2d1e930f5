//! Per-node routing state: k-buckets and the routing table.
//!
//! A routing table owns `m` buckets, one per possible bit length of the XOR
//! distance between the owner and a peer. A peer whose distance has its
//! highest set bit at position `i` lives in bucket `i`, so bucket 0 holds
//! the peers sharing all but the last identifier bit with the owner and
//! bucket `m - 1` holds the peers differing in the first bit.
//!
//! Inserting into a full bucket is a two-phase operation: [`RoutingTable::insert`]
//! returns a [`PendingInsert`] naming the least-recently-seen incumbent, the
//! caller pings it, and [`RoutingTable::resolve_full_bucket`] applies the
//! outcome. Keeping the ping outside the data structure puts liveness where
//! it belongs — at the RPC layer — and gives tests a seam to stub it.

use crate::identifier::{Identifier, Peer};

/// Outcome of offering a peer to a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketInsert {
    /// The peer was new and the bucket had room.
    Inserted,
    /// The peer was already present and moved to the most-recently-seen end.
    Refreshed,
    /// The bucket is full; the head must be pinged before anything changes.
    Full { incumbent: Peer },
}

/// A bounded, ordered list of distinct peers.
///
/// Head is least recently seen, tail most recently seen. The bound and the
/// no-duplicates rule are invariants; recency is encoded purely by position.
#[derive(Debug, Clone)]
pub struct Bucket {
    k: usize,
    peers: Vec<Peer>,
}

impl Bucket {
    pub fn new(k: usize) -> Self {
        assert!(k > 0, "bucket capacity must be at least 1");
        Self {
            k,
            peers: Vec::new(),
        }
    }

    /// Offer a peer to the bucket.
    ///
    /// Present peers are refreshed (moved to the tail); new peers are
    /// appended while there is room. A full bucket changes nothing yet and
    /// reports its least-recently-seen head as the eviction candidate.
    pub fn insert(&mut self, peer: Peer) -> BucketInsert {
        if let Some(pos) = self.position(&peer) {
            let existing = self.peers.remove(pos);
            self.peers.push(existing);
            return BucketInsert::Refreshed;
        }
        if self.peers.len() < self.k {
            self.peers.push(peer);
            return BucketInsert::Inserted;
        }
        BucketInsert::Full {
            incumbent: self.peers[0],
        }
    }

    /// Complete a full-bucket insert after the incumbent head was pinged.
    ///
    /// A live incumbent is moved to the tail and the candidate is discarded;
    /// a dead incumbent is evicted and the candidate appended. Long-lived
    /// peers are kept in preference to newly seen ones.
    pub fn resolve_full(&mut self, incumbent: Peer, candidate: Peer, incumbent_alive: bool) {
        let Some(pos) = self.position(&incumbent) else {
            return;
        };
        let head = self.peers.remove(pos);
        if incumbent_alive {
            self.peers.push(head);
        } else if self.position(&candidate).is_none() && self.peers.len() < self.k {
            self.peers.push(candidate);
        }
    }

    fn position(&self, peer: &Peer) -> Option<usize> {
        self.peers.iter().position(|entry| entry.id == peer.id)
    }

    /// Peers in head-to-tail (least to most recently seen) order.
    pub fn snapshot(&self) -> &[Peer] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// A full-bucket insert waiting on the incumbent's liveness check.
#[derive(Debug, Clone, Copy)]
pub struct PendingInsert {
    pub bucket: usize,
    pub incumbent: Peer,
    pub candidate: Peer,
}

/// The routing table of one node.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    owner: Identifier,
    k: usize,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    /// Create an empty table for `owner` with one bucket per identifier bit.
    pub fn new(owner: Identifier, k: usize) -> Self {
        let buckets = (0..owner.bits()).map(|_| Bucket::new(k)).collect();
        Self { owner, k, buckets }
    }

    pub fn owner(&self) -> &Identifier {
        &self.owner
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket(&self, index: usize) -> &Bucket {
        &self.buckets[index]
    }

    /// Offer a peer to its bucket. The owner itself is never stored.
    ///
    /// `Some(PendingInsert)` means the bucket was full: the caller must ping
    /// the incumbent and finish with [`RoutingTable::resolve_full_bucket`].
    pub fn insert(&mut self, peer: Peer) -> Option<PendingInsert> {
        if peer.id == self.owner {
            return None;
        }
        let index = self
            .owner
            .distance(&peer.id)
            .bucket_index()
            .expect("distinct identifiers have a nonzero distance");
        match self.buckets[index].insert(peer) {
            BucketInsert::Inserted | BucketInsert::Refreshed => None,
            BucketInsert::Full { incumbent } => Some(PendingInsert {
                bucket: index,
                incumbent,
                candidate: peer,
            }),
        }
    }

    /// Apply the liveness verdict for a pending full-bucket insert.
    pub fn resolve_full_bucket(&mut self, pending: PendingInsert, incumbent_alive: bool) {
        self.buckets[pending.bucket].resolve_full(
            pending.incumbent,
            pending.candidate,
            incumbent_alive,
        );
    }

    /// All peers of the table, in bucket-index order and head-to-tail within
    /// a bucket. This is the edge enumeration order of the GML output.
    pub fn peers(&self) -> Vec<Peer> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.snapshot().iter().copied())
            .collect()
    }

    /// The up-to-`k` known peers closest to `target`, ascending by distance.
    ///
    /// The target's own bucket is taken first: every peer there is closer to
    /// the target than any peer elsewhere. Buckets with a smaller index hold
    /// peers sharing a longer prefix with the owner than the target does and
    /// carry no structural ordering among themselves, so they are pooled and
    /// sorted together. Buckets with a larger index get monotonically
    /// farther from the target as the index grows, so they are drained in
    /// index order until `k` peers are collected.
    pub fn k_closest(&self, target: &Identifier) -> Vec<Peer> {
        let mut closest: Vec<Peer> = Vec::new();

        let target_index = self.owner.distance(target).bucket_index();
        if let Some(index) = target_index {
            append_by_distance(&mut closest, self.buckets[index].snapshot().to_vec(), target);
        }

        if closest.len() < self.k {
            let (pooled_end, lower_start) = match target_index {
                Some(index) => (index, index + 1),
                None => (0, 0),
            };

            let pooled: Vec<Peer> = self.buckets[..pooled_end]
                .iter()
                .flat_map(|bucket| bucket.snapshot().iter().copied())
                .collect();
            append_by_distance(&mut closest, pooled, target);

            for bucket in &self.buckets[lower_start..] {
                if closest.len() >= self.k {
                    break;
                }
                append_by_distance(&mut closest, bucket.snapshot().to_vec(), target);
            }
        }

        closest.truncate(self.k);
        closest
    }
}

/// Sort `peers` by distance to `target` (stable) and append them.
fn append_by_distance(closest: &mut Vec<Peer>, mut peers: Vec<Peer>, target: &Identifier) {
    peers.sort_by_key(|peer| peer.id.distance(target));
    closest.extend(peers);
}

#[cfg(test)]
mod tests {
    use crate::identifier::NodeRef;

    use super::*;

    fn id(bits: u16, value: u128) -> Identifier {
        let mut bytes = [0u8; 32];
        bytes[16..].copy_from_slice(&value.to_be_bytes());
        Identifier::from_bytes(bits, bytes).expect("value fits the width")
    }

    fn peer(bits: u16, value: u128) -> Peer {
        Peer::new(NodeRef::new(value as usize), id(bits, value))
    }

    #[test]
    fn bucket_appends_until_full() {
        let mut bucket = Bucket::new(2);
        assert_eq!(bucket.insert(peer(8, 1)), BucketInsert::Inserted);
        assert_eq!(bucket.insert(peer(8, 2)), BucketInsert::Inserted);
        assert_eq!(
            bucket.insert(peer(8, 3)),
            BucketInsert::Full {
                incumbent: peer(8, 1)
            }
        );
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn bucket_refresh_moves_to_tail() {
        let mut bucket = Bucket::new(3);
        bucket.insert(peer(8, 1));
        bucket.insert(peer(8, 2));
        bucket.insert(peer(8, 3));
        assert_eq!(bucket.insert(peer(8, 1)), BucketInsert::Refreshed);
        let order: Vec<u128> = bucket.snapshot().iter().map(|p| p.node.index() as u128).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn table_rejects_owner_and_places_by_distance_bit_length() {
        let owner = id(8, 0);
        let mut table = RoutingTable::new(owner, 4);
        assert!(table.insert(Peer::new(NodeRef::new(9), owner)).is_none());
        assert!(table.peers().is_empty());

        for value in [1u128, 2, 3, 4, 128] {
            assert!(table.insert(peer(8, value)).is_none());
        }
        for (index, bucket) in (0..table.bucket_count()).map(|i| (i, table.bucket(i))) {
            for entry in bucket.snapshot() {
                assert_eq!(owner.distance(&entry.id).bucket_index(), Some(index));
            }
        }
        assert_eq!(table.bucket(1).len(), 2); // distances 2 and 3
    }

    #[test]
    fn full_bucket_live_head_moves_to_tail_and_discards_candidate() {
        let owner = id(8, 0);
        let mut table = RoutingTable::new(owner, 2);
        // Distances 4, 5, 6 all have bit length 3: one bucket, capacity 2.
        let (a, b, c) = (peer(8, 4), peer(8, 5), peer(8, 6));
        assert!(table.insert(a).is_none());
        assert!(table.insert(b).is_none());

        let pending = table.insert(c).expect("bucket is full");
        assert_eq!(pending.incumbent, a);
        assert_eq!(pending.candidate, c);
        table.resolve_full_bucket(pending, true);

        let order: Vec<Peer> = table.bucket(2).snapshot().to_vec();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn full_bucket_dead_head_is_evicted_for_the_candidate() {
        let owner = id(8, 0);
        let mut table = RoutingTable::new(owner, 2);
        let (a, b, c) = (peer(8, 4), peer(8, 5), peer(8, 6));
        assert!(table.insert(a).is_none());
        assert!(table.insert(b).is_none());

        let pending = table.insert(c).expect("bucket is full");
        table.resolve_full_bucket(pending, false);

        let order: Vec<Peer> = table.bucket(2).snapshot().to_vec();
        assert_eq!(order, vec![b, c]);
    }

    #[test]
    fn bucket_never_exceeds_capacity() {
        let owner = id(8, 0);
        let mut table = RoutingTable::new(owner, 3);
        for value in 1u128..=255 {
            if let Some(pending) = table.insert(peer(8, value)) {
                table.resolve_full_bucket(pending, true);
            }
        }
        for index in 0..table.bucket_count() {
            assert!(table.bucket(index).len() <= 3);
        }
    }

    // Owner 00000000, peers at distances 1, 2, 4, 8, 16; the three nearest
    // to the owner's own identifier come back in ascending order.
    #[test]
    fn k_closest_returns_ascending_distances_to_the_owner_target() {
        let owner = id(8, 0);
        let mut table = RoutingTable::new(owner, 3);
        for value in [1u128, 2, 4, 8, 16] {
            assert!(table.insert(peer(8, value)).is_none());
        }
        let closest = table.k_closest(&owner);
        let values: Vec<u128> = closest.iter().map(|p| p.node.index() as u128).collect();
        assert_eq!(values, vec![1, 2, 4]);
    }

    #[test]
    fn k_closest_pools_nearer_prefix_buckets_when_needed() {
        let owner = id(8, 0b1000_0000);
        let mut table = RoutingTable::new(owner, 4);
        // Target shares no prefix with the owner: its bucket is index 7.
        let target = id(8, 0b0000_0001);
        let peers = [
            peer(8, 0b1000_0010), // bucket 1
            peer(8, 0b1001_0000), // bucket 4
            peer(8, 0b0100_0000), // bucket 7, distance 65 to the target
            peer(8, 0b0000_0011), // bucket 7, distance 2 to the target
        ];
        for p in peers {
            assert!(table.insert(p).is_none());
        }
        let closest = table.k_closest(&target);
        let dist: Vec<usize> = closest
            .iter()
            .map(|p| p.id.distance(&target).bit_length())
            .collect();
        let mut sorted = dist.clone();
        sorted.sort_unstable();
        assert_eq!(dist, sorted, "result must ascend by distance");
        assert_eq!(closest.len(), 4);
        assert_eq!(closest[0], peers[3]);
    }

    #[test]
    fn k_closest_truncates_to_k() {
        let owner = id(8, 0);
        let mut table = RoutingTable::new(owner, 2);
        for value in [3u128, 5, 9, 17, 33] {
            let _ = table.insert(peer(8, value));
        }
        let closest = table.k_closest(&id(8, 1));
        assert_eq!(closest.len(), 2);
    }
}
