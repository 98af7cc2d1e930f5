//! The centralized driver that grows a network to its target size.
//!
//! The coordinator owns the only RNG of the simulation and threads it
//! through every random draw, so a fixed seed reproduces the run — same
//! identifiers, same bootstraps, same refresh targets, same GML.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifier::{Identifier, MAX_BITS};
use crate::network::{Network, Node};

/// Fraction of `k` drawn as refresh targets per bucket, floored, minimum 1.
const REFRESH_TARGETS_PER_BUCKET: f64 = 0.1;

/// Bound on consecutive identifier collisions before a join is declared
/// hopeless. Far beyond anything a realistic `m` can produce.
const MAX_COLLIDING_JOINS: usize = 1_000_000;

/// Builds a Kademlia overlay of `n` nodes over an `m`-bit identifier space
/// with `k`-sized buckets.
pub struct Coordinator {
    m: u16,
    n: usize,
    k: usize,
    rng: StdRng,
    network: Network,
}

impl Coordinator {
    /// Create a coordinator seeded from OS entropy.
    pub fn new(m: u16, n: usize, k: usize) -> Result<Self> {
        Self::from_rng(m, n, k, StdRng::from_entropy())
    }

    /// Create a coordinator with a fixed seed for reproducible runs.
    pub fn with_seed(m: u16, n: usize, k: usize, seed: u64) -> Result<Self> {
        Self::from_rng(m, n, k, StdRng::seed_from_u64(seed))
    }

    fn from_rng(m: u16, n: usize, k: usize, rng: StdRng) -> Result<Self> {
        if m == 0 || n == 0 || k == 0 {
            return Err(Error::invalid("m, n, and k must all be at least 1"));
        }
        if m > MAX_BITS {
            return Err(Error::invalid(format!("m must not exceed {MAX_BITS}")));
        }
        if u32::from(m) < 64 && (1u128 << m) < n as u128 {
            return Err(Error::invalid(format!(
                "2^{m} identifiers cannot host {n} nodes"
            )));
        }
        Ok(Self {
            m,
            n,
            k,
            rng,
            network: Network::new(),
        })
    }

    /// Run the simulation: clear the network, seed it with one node, then
    /// join random nodes until `n` of them are in, warming each joiner's
    /// routing table with one burst of bucket-targeted lookups.
    pub fn run(&mut self) -> Result<()> {
        self.initialize()?;
        self.construct_routing_tables()
    }

    /// Phase one: an empty network and a lone bootstrap node. The first
    /// node has nobody to look up, so it joins without refresh targets.
    fn initialize(&mut self) -> Result<()> {
        self.network.clear();
        let first = self.random_node()?;
        debug!(id = %first.identifier(), "seeding network");
        let _ = self.network.join(first);
        Ok(())
    }

    /// Phase two: grow the network to `n` nodes.
    fn construct_routing_tables(&mut self) -> Result<()> {
        let mut collisions = 0usize;
        while self.network.len() != self.n {
            let node = self.random_node()?;
            let id = *node.identifier();
            let targets = self.refresh_targets(&id)?;
            match self
                .network
                .join_with_refresh(node, &targets, &mut self.rng)
            {
                Some(joined) => {
                    debug!(id = %id, index = joined.index(), "node joined");
                    collisions = 0;
                }
                None => {
                    collisions += 1;
                    warn!(collisions, "identifier collision while joining");
                    if collisions >= MAX_COLLIDING_JOINS {
                        return Err(Error::IdentifierSpaceExhausted {
                            attempts: collisions,
                        });
                    }
                }
            }
        }
        debug!(nodes = self.network.len(), "network construction finished");
        Ok(())
    }

    fn random_node(&mut self) -> Result<Node> {
        let id = Identifier::random(self.m, &mut self.rng)?;
        Ok(Node::new(id, self.k))
    }

    /// Synthesize lookup targets paired with every bucket of `id`.
    ///
    /// Per bucket index, `max(1, floor(k / 10))` identifiers are drawn with
    /// [`Identifier::random_in_bucket`]; duplicates collapse in the set.
    /// Looking each one up tends to populate the matching bucket, which is
    /// how real Kademlia nodes self-refresh after joining.
    fn refresh_targets(&mut self, id: &Identifier) -> Result<BTreeSet<Identifier>> {
        let per_bucket = ((self.k as f64 * REFRESH_TARGETS_PER_BUCKET) as usize).max(1);
        let mut targets = BTreeSet::new();
        for bucket in 0..usize::from(self.m) {
            for _ in 0..per_bucket {
                targets.insert(id.random_in_bucket(bucket, &mut self.rng)?);
            }
        }
        Ok(targets)
    }

    /// The constructed network; empty until [`Coordinator::run`] completes.
    pub fn network(&self) -> &Network {
        &self.network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_parameters() {
        assert!(Coordinator::new(0, 1, 1).is_err());
        assert!(Coordinator::new(4, 0, 1).is_err());
        assert!(Coordinator::new(4, 1, 0).is_err());
    }

    #[test]
    fn rejects_widths_beyond_256() {
        assert!(Coordinator::new(257, 1, 1).is_err());
        assert!(Coordinator::new(256, 1, 1).is_ok());
    }

    #[test]
    fn rejects_identifier_spaces_smaller_than_n() {
        assert!(Coordinator::new(2, 5, 1).is_err());
        assert!(Coordinator::new(2, 4, 1).is_ok());
        assert!(Coordinator::new(64, usize::MAX, 1).is_ok());
    }

    #[test]
    fn refresh_targets_cover_every_bucket_index() {
        let mut coordinator = Coordinator::with_seed(8, 2, 30, 11).unwrap();
        let id = Identifier::random(8, &mut coordinator.rng).unwrap();
        let targets = coordinator.refresh_targets(&id).unwrap();

        // floor(30 * 0.1) = 3 draws per bucket across 8 buckets, minus any
        // duplicates collapsed by the set.
        assert!(targets.len() <= 24);
        let mut buckets_hit = BTreeSet::new();
        for target in &targets {
            buckets_hit.insert(id.distance(target).bucket_index().unwrap());
        }
        assert_eq!(buckets_hit.len(), 8, "every bucket receives a target");
    }

    #[test]
    fn small_k_still_draws_one_target_per_bucket() {
        let mut coordinator = Coordinator::with_seed(4, 2, 2, 3).unwrap();
        let id = Identifier::random(4, &mut coordinator.rng).unwrap();
        let targets = coordinator.refresh_targets(&id).unwrap();
        assert_eq!(targets.len(), 4);
    }

    #[test]
    fn run_reaches_the_requested_size() {
        let mut coordinator = Coordinator::with_seed(16, 24, 4, 5).unwrap();
        coordinator.run().unwrap();
        assert_eq!(coordinator.network().len(), 24);
    }

    #[test]
    fn rerun_rebuilds_from_scratch() {
        let mut coordinator = Coordinator::with_seed(16, 8, 4, 5).unwrap();
        coordinator.run().unwrap();
        coordinator.run().unwrap();
        assert_eq!(coordinator.network().len(), 8);
    }
}
