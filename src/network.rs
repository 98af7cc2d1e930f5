//! The simulated network: node arena, RPC surface, and iterative lookup.
//!
//! The network owns every joined [`Node`] in an arena ordered by join time;
//! a [`NodeRef`] is an index into it. Routing tables reference peers by
//! handle, which breaks the node ↔ routing-table ownership cycle and makes
//! equality-by-identifier structural.
//!
//! RPCs are simulated synchronously. `ping` and `find_node` are the only
//! two, both fallible with [`Error::Timeout`]; a timeout never occurs during
//! a simulation run, but the recovery paths stay live because tests inject
//! unreachability with [`Network::set_reachable`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use rand::Rng;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifier::{Identifier, NodeRef, Peer};
use crate::lookup::KClosestQueue;
use crate::routing::RoutingTable;
use crate::ALPHA;

/// A virtual Kademlia node: one identifier, one routing table.
///
/// Identity is the identifier alone; the network enforces uniqueness at
/// join time, so arena handles and identifiers agree on equality.
#[derive(Debug, Clone)]
pub struct Node {
    id: Identifier,
    table: RoutingTable,
}

impl Node {
    /// Create a node with an `id.bits()`-bucket routing table of width `k`.
    pub fn new(id: Identifier, k: usize) -> Self {
        let table = RoutingTable::new(id, k);
        Self { id, table }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.id
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }
}

/// Cumulative RPC and lookup counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkStats {
    pub find_node_calls: usize,
    pub ping_calls: usize,
    pub lookup_rounds: usize,
    /// Most peers queried in any α-bounded round.
    pub max_queries_per_round: usize,
    /// Most peers queried in any final unbounded pass.
    pub max_queries_last_pass: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Network
// ─────────────────────────────────────────────────────────────────────────────

/// Registry and driver of the joined node set.
///
/// Two coordinated views are kept: the arena (an ordered list, for O(1)
/// uniform random selection) and an identifier index (for O(1) membership).
#[derive(Debug, Default)]
pub struct Network {
    nodes: Vec<Node>,
    index: HashMap<Identifier, NodeRef>,
    reachable: Vec<bool>,
    stats: NetworkStats,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.index.contains_key(id)
    }

    /// Remove every node from the network.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.reachable.clear();
    }

    pub fn node(&self, node: NodeRef) -> &Node {
        &self.nodes[node.index()]
    }

    /// The contact record for a joined node.
    pub fn peer(&self, node: NodeRef) -> Peer {
        Peer::new(node, self.nodes[node.index()].id)
    }

    /// Nodes in join order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeRef, &Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeRef::new(index), node))
    }

    /// All peers in `node`'s routing table, in bucket order.
    pub fn known_peers(&self, node: NodeRef) -> Vec<Peer> {
        self.nodes[node.index()].table.peers()
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    /// Register a node. Returns its handle, or `None` if a node with the
    /// same identifier already joined.
    pub fn join(&mut self, node: Node) -> Option<NodeRef> {
        if self.contains(&node.id) {
            return None;
        }
        let handle = NodeRef::new(self.nodes.len());
        self.index.insert(node.id, handle);
        self.nodes.push(node);
        self.reachable.push(true);
        Some(handle)
    }

    /// Join a node and warm its routing table.
    ///
    /// A bootstrap peer is drawn before registration (so it can never be
    /// the joining node), the node is registered, and then one lookup runs
    /// per refresh target through that bootstrap. On an empty network the
    /// lookups are skipped — there is nobody to learn from yet.
    pub fn join_with_refresh(
        &mut self,
        node: Node,
        refresh_targets: &BTreeSet<Identifier>,
        rng: &mut impl Rng,
    ) -> Option<NodeRef> {
        if self.contains(&node.id) {
            return None;
        }
        let bootstrap = self.random_peer(rng);
        let joined = self.join(node)?;
        if let Some(bootstrap) = bootstrap {
            for target in refresh_targets {
                self.lookup(joined, bootstrap, target);
            }
        }
        Some(joined)
    }

    /// A uniformly random joined node, or `None` on an empty network.
    pub fn random_peer(&self, rng: &mut impl Rng) -> Option<NodeRef> {
        if self.nodes.is_empty() {
            return None;
        }
        Some(NodeRef::new(rng.gen_range(0..self.nodes.len())))
    }

    /// Flip the simulated reachability of a node.
    ///
    /// The simulator itself never calls this: every node stays reachable for
    /// the whole run. It exists so the timeout-recovery branches of the
    /// bucket policy and the lookup can be exercised.
    pub fn set_reachable(&mut self, node: NodeRef, reachable: bool) {
        self.reachable[node.index()] = reachable;
    }

    /// Seed `owner`'s routing table with `peer` directly, outside the join
    /// protocol. Harness operation for constructing bespoke topologies.
    pub fn introduce(&mut self, owner: NodeRef, peer: NodeRef) {
        let contact = self.peer(peer);
        self.insert_contact(owner, contact);
    }

    // ─────────────────────────────────────────────────────────────────────
    // RPC surface
    // ─────────────────────────────────────────────────────────────────────

    /// PING: succeeds iff the peer is reachable.
    pub fn ping(&mut self, node: NodeRef) -> Result<()> {
        self.stats.ping_calls += 1;
        if self.reachable[node.index()] {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }

    /// FIND_NODE: ask `callee` for its `k` closest peers to `target`.
    ///
    /// The traversed peers are inserted into the callee's routing table
    /// first — the callee learns about the caller and every intermediate
    /// hop — and only then is the reply computed, so a reply can surface
    /// the caller itself.
    pub fn find_node(
        &mut self,
        callee: NodeRef,
        target: &Identifier,
        traversed: &BTreeSet<NodeRef>,
    ) -> Result<Vec<Peer>> {
        self.stats.find_node_calls += 1;
        if !self.reachable[callee.index()] {
            return Err(Error::Timeout);
        }
        let contacts: Vec<Peer> = traversed.iter().map(|&node| self.peer(node)).collect();
        for contact in contacts {
            self.insert_contact(callee, contact);
        }
        Ok(self.nodes[callee.index()].table.k_closest(target))
    }

    fn try_find_node(
        &mut self,
        callee: NodeRef,
        target: &Identifier,
        traversed: &BTreeSet<NodeRef>,
    ) -> Option<Vec<Peer>> {
        self.find_node(callee, target, traversed).ok()
    }

    /// Route a contact into `owner`'s table, pinging the incumbent head
    /// when the target bucket is full.
    fn insert_contact(&mut self, owner: NodeRef, contact: Peer) {
        let pending = self.nodes[owner.index()].table.insert(contact);
        if let Some(pending) = pending {
            let incumbent_alive = self.ping(pending.incumbent.node).is_ok();
            self.nodes[owner.index()]
                .table
                .resolve_full_bucket(pending, incumbent_alive);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Iterative lookup
    // ─────────────────────────────────────────────────────────────────────

    /// Locate the up-to-`k` peers closest to `target`, starting from
    /// `bootstrap`, enriching `origin`'s routing table along the way.
    ///
    /// Rounds iterate the queue in ascending distance order and query each
    /// not-yet-queried peer, stopping after α + 1 replies. Replies merge
    /// after the iteration: every found peer goes into `origin`'s routing
    /// table and is offered to the queue. A round that fails to improve the
    /// closest known peer triggers one final pass that queries every
    /// remaining queued peer without the α bound and without growing the
    /// queue — which is what guarantees termination.
    pub fn lookup(&mut self, origin: NodeRef, bootstrap: NodeRef, target: &Identifier) -> Vec<Peer> {
        let k = self.nodes[origin.index()].table.k();
        let mut queue = KClosestQueue::new(self.peer(bootstrap), *target, k, origin);
        let mut queried: HashSet<NodeRef> = HashSet::new();
        let mut inserted: HashSet<NodeRef> = HashSet::new();
        let mut last_pass = false;
        let mut rounds = 0usize;

        loop {
            let closest_before = queue.closest();
            let mut new_queried: Vec<NodeRef> = Vec::new();
            let mut found: HashMap<NodeRef, Vec<Peer>> = HashMap::new();

            for peer in queue.snapshot() {
                if !queried.insert(peer.node) {
                    continue;
                }
                let traversed = queue.traversed(peer.node).cloned().unwrap_or_default();
                let Some(peers) = self.try_find_node(peer.node, target, &traversed) else {
                    continue;
                };
                found.insert(peer.node, peers);
                new_queried.push(peer.node);
                if !last_pass && new_queried.len() > ALPHA {
                    break;
                }
            }

            self.stats.lookup_rounds += 1;
            rounds += 1;
            if last_pass {
                self.stats.max_queries_last_pass =
                    self.stats.max_queries_last_pass.max(new_queried.len());
            } else {
                self.stats.max_queries_per_round =
                    self.stats.max_queries_per_round.max(new_queried.len());
            }

            for &queried_peer in &new_queried {
                for &found_peer in &found[&queried_peer] {
                    if !inserted.insert(found_peer.node) {
                        continue;
                    }
                    self.insert_contact(origin, found_peer);
                    if !last_pass {
                        queue.try_add(found_peer, queried_peer);
                    }
                }
            }

            trace!(
                round = rounds,
                queried = new_queried.len(),
                candidates = queue.len(),
                last_pass,
                "lookup round complete"
            );

            if last_pass {
                break;
            }
            if queue.closest() == closest_before {
                last_pass = true;
            }
        }

        debug!(
            origin = %self.nodes[origin.index()].id,
            target = %target,
            rounds,
            queried = queried.len(),
            "lookup finished"
        );
        queue.snapshot()
    }
}

impl fmt::Display for Network {
    /// The GML rendering of the network graph.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::gml::render(self))
    }
}
