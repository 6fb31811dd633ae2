//! Validator peer topology for controlled test networks.
//!
//! Given an ordered validator list of size N, builds a bounded-degree tree
//! with fan-out `ceil(sqrt(N-1))`:
//!
//! ```text
//!            0            root
//!         /     \
//!        1       2        layer 1 (fan-out children of root)
//!       /         \
//!      3           4      layer 2 (leaves)
//! ```
//!
//! Root and layer-1 validators are restricted to exactly the tree edges:
//! their inbound/outbound peer caps are forced to zero so the engine's peer
//! exchange cannot add edges behind the topology's back. Leaves keep generous
//! default caps so external full nodes and seeds can attach.
//!
//! This is a reproducible harness topology, not a general gossip mesh.

use rand::seq::SliceRandom;
use rand::Rng;

/// Default inbound peer cap for leaf validators and full nodes.
pub const DEFAULT_MAX_INBOUND: u32 = 40;
/// Default outbound peer cap for leaf validators and full nodes.
pub const DEFAULT_MAX_OUTBOUND: u32 = 10;

/// Connectivity assignment for one validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSlot {
    /// Indices of the validators this one connects to.
    pub peers: Vec<usize>,
    /// Maximum inbound connections beyond the explicit edges.
    pub max_inbound: u32,
    /// Maximum outbound connections beyond the explicit edges.
    pub max_outbound: u32,
}

impl PeerSlot {
    fn strict(peers: Vec<usize>) -> Self {
        PeerSlot {
            peers,
            max_inbound: 0,
            max_outbound: 0,
        }
    }

    fn leaf(peers: Vec<usize>) -> Self {
        PeerSlot {
            peers,
            max_inbound: DEFAULT_MAX_INBOUND,
            max_outbound: DEFAULT_MAX_OUTBOUND,
        }
    }
}

/// Topology construction failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("topology requires at least one validator")]
    Empty,

    #[error("validator index {index} out of range for {len} validators")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("network of {validators} validators has {leaves} leaves, need at least 2 to attach a full node")]
    NotEnoughLeaves { validators: usize, leaves: usize },
}

/// The peer graph over an ordered validator list.
#[derive(Debug, Clone)]
pub struct PeerTopology {
    slots: Vec<PeerSlot>,
    fan_out: usize,
    leaves: Vec<usize>,
}

impl PeerTopology {
    /// Build the tree over `n` validators (indices `0..n`).
    pub fn build(n: usize) -> Result<Self, TopologyError> {
        if n == 0 {
            return Err(TopologyError::Empty);
        }

        let fan_out = ceil_sqrt(n - 1);
        let layer1_end = (1 + fan_out).min(n);
        let mut slots = Vec::with_capacity(n);
        let mut leaves = Vec::new();

        // Root connects to the first fan_out validators after it.
        slots.push(PeerSlot::strict((1..layer1_end).collect()));

        // Layer 1: root plus up to fan_out-1 contiguously assigned children.
        for i in 1..layer1_end {
            let mut peers = vec![0];
            peers.extend(children_of(i, fan_out, n));
            slots.push(PeerSlot::strict(peers));
        }

        // Layer 2: a single edge back to the parent.
        for j in layer1_end..n {
            let parent = 1 + (j - layer1_end) / (fan_out - 1);
            slots.push(PeerSlot::leaf(vec![parent]));
            leaves.push(j);
        }

        Ok(PeerTopology {
            slots,
            fan_out,
            leaves,
        })
    }

    /// The tree's fan-out, `ceil(sqrt(N-1))`.
    pub fn fan_out(&self) -> usize {
        self.fan_out
    }

    /// Connectivity for one validator.
    pub fn slot(&self, index: usize) -> Result<&PeerSlot, TopologyError> {
        self.slots.get(index).ok_or(TopologyError::IndexOutOfRange {
            index,
            len: self.slots.len(),
        })
    }

    /// Indices of the leaf validators.
    pub fn leaves(&self) -> &[usize] {
        &self.leaves
    }

    /// Connectivity for a non-validator node: two distinct randomly chosen
    /// leaves, with the default (generous) peer caps.
    pub fn attach_full_node<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PeerSlot, TopologyError> {
        if self.leaves.len() < 2 {
            return Err(TopologyError::NotEnoughLeaves {
                validators: self.slots.len(),
                leaves: self.leaves.len(),
            });
        }
        let peers: Vec<usize> = self
            .leaves
            .choose_multiple(rng, 2)
            .copied()
            .collect();
        Ok(PeerSlot::leaf(peers))
    }
}

/// Children of layer-1 validator `i`, assigned contiguously from the layer-2
/// pool that starts right after the layer-1 block.
fn children_of(i: usize, fan_out: usize, n: usize) -> std::ops::Range<usize> {
    let per_parent = fan_out.saturating_sub(1);
    let pool_start = 1 + fan_out;
    let start = (pool_start + (i - 1) * per_parent).min(n);
    let end = (start + per_parent).min(n);
    start..end
}

/// Smallest `k` with `k * k >= x`.
fn ceil_sqrt(x: usize) -> usize {
    let mut k = (x as f64).sqrt() as usize;
    while k * k < x {
        k += 1;
    }
    k
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_five_validator_tree() {
        let topo = PeerTopology::build(5).unwrap();
        assert_eq!(topo.fan_out(), 2);

        assert_eq!(topo.slot(0).unwrap().peers, vec![1, 2]);
        assert_eq!(topo.slot(1).unwrap().peers, vec![0, 3]);
        assert_eq!(topo.slot(2).unwrap().peers, vec![0, 4]);
        assert_eq!(topo.slot(3).unwrap().peers, vec![1]);
        assert_eq!(topo.slot(4).unwrap().peers, vec![2]);
    }

    #[test]
    fn test_five_validator_caps() {
        let topo = PeerTopology::build(5).unwrap();

        for non_leaf in [0, 1, 2] {
            let slot = topo.slot(non_leaf).unwrap();
            assert_eq!(slot.max_inbound, 0, "validator {non_leaf}");
            assert_eq!(slot.max_outbound, 0, "validator {non_leaf}");
        }
        for leaf in [3, 4] {
            let slot = topo.slot(leaf).unwrap();
            assert_eq!(slot.max_inbound, DEFAULT_MAX_INBOUND);
            assert_eq!(slot.max_outbound, DEFAULT_MAX_OUTBOUND);
        }
        assert_eq!(topo.leaves(), &[3, 4]);
    }

    #[test]
    fn test_full_node_attaches_to_two_distinct_leaves() {
        let topo = PeerTopology::build(5).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..16 {
            let slot = topo.attach_full_node(&mut rng).unwrap();
            assert_eq!(slot.peers.len(), 2);
            assert_ne!(slot.peers[0], slot.peers[1]);
            assert!(slot.peers.iter().all(|p| topo.leaves().contains(p)));
            assert_eq!(slot.max_inbound, DEFAULT_MAX_INBOUND);
            assert_eq!(slot.max_outbound, DEFAULT_MAX_OUTBOUND);
        }
    }

    #[test]
    fn test_edges_are_symmetric() {
        for n in [3usize, 5, 10, 17, 50] {
            let topo = PeerTopology::build(n).unwrap();
            for i in 0..n {
                for &p in &topo.slot(i).unwrap().peers {
                    assert!(
                        topo.slot(p).unwrap().peers.contains(&i),
                        "edge {i}->{p} not mirrored (n={n})"
                    );
                }
            }
        }
    }

    #[test]
    fn test_every_validator_reaches_root() {
        for n in [1usize, 2, 3, 5, 10, 26, 100] {
            let topo = PeerTopology::build(n).unwrap();
            // Walk up: leaves point at layer 1, layer 1 points at root.
            for i in 1..n {
                let first = topo.slot(i).unwrap().peers[0];
                if first != 0 {
                    assert_eq!(topo.slot(first).unwrap().peers[0], 0, "n={n} i={i}");
                }
            }
        }
    }

    #[test]
    fn test_degenerate_sizes() {
        assert!(matches!(PeerTopology::build(0), Err(TopologyError::Empty)));

        let solo = PeerTopology::build(1).unwrap();
        assert!(solo.slot(0).unwrap().peers.is_empty());
        assert!(solo.leaves().is_empty());

        let pair = PeerTopology::build(2).unwrap();
        assert_eq!(pair.slot(0).unwrap().peers, vec![1]);
        assert_eq!(pair.slot(1).unwrap().peers, vec![0]);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert!(matches!(
            pair.attach_full_node(&mut rng),
            Err(TopologyError::NotEnoughLeaves { .. })
        ));
    }

    #[test]
    fn test_ceil_sqrt() {
        assert_eq!(ceil_sqrt(0), 0);
        assert_eq!(ceil_sqrt(1), 1);
        assert_eq!(ceil_sqrt(2), 2);
        assert_eq!(ceil_sqrt(4), 2);
        assert_eq!(ceil_sqrt(5), 3);
        assert_eq!(ceil_sqrt(9), 3);
        assert_eq!(ceil_sqrt(10), 4);
    }
}
