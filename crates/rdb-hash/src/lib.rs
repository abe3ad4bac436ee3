#![warn(missing_docs)]
//! Weighted consistent hashing: maps a key deterministically onto one of a
//! set of nodes, with each node's share of the key space proportional to
//! its declared weight.

use rdb_error::{ErrorKind, RdbError};

/// A weighted consistent-hash ring over nodes of type `N`.
///
/// Construction builds a flat array of length `Σ weights`, with each node
/// repeated `weight` times contiguously; lookup is `MD5(key) mod Σ weights`
/// indexing into that array. MD5 is specified (not just "a hash") so two
/// independent implementations agree bit-for-bit on the same key.
#[derive(Debug, Clone)]
pub struct ConsistentHasher<N> {
    ring: Vec<N>,
}

impl<N: Clone> ConsistentHasher<N> {
    /// Build a ring from `(node, weight)` pairs. Weights must be `>= 1` and
    /// `nodes` must be non-empty.
    pub fn new(nodes: impl IntoIterator<Item = (N, u32)>) -> Result<Self, RdbError> {
        let mut ring = Vec::new();
        for (node, weight) in nodes {
            if weight == 0 {
                return Err(RdbError::new(
                    ErrorKind::InvalidKey,
                    "node weight must be at least 1",
                ));
            }
            ring.extend(std::iter::repeat_n(node, weight as usize));
        }
        if ring.is_empty() {
            return Err(RdbError::new(
                ErrorKind::InvalidKey,
                "consistent hasher requires at least one node",
            ));
        }
        Ok(Self { ring })
    }

    /// Total ring weight (`Σ weights`).
    pub fn total_weight(&self) -> usize {
        self.ring.len()
    }

    /// The ring index `MD5(key) mod total_weight` a key maps to.
    pub fn index_for(&self, key: &[u8]) -> usize {
        let digest = md5::compute(key);
        let value = u128::from_be_bytes(digest.0);
        (value % self.ring.len() as u128) as usize
    }

    /// The node a key maps to.
    pub fn node_for(&self, key: &[u8]) -> &N {
        &self.ring[self.index_for(key)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_empty_node_list() {
        let err = ConsistentHasher::<&str>::new(std::iter::empty()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidKey);
    }

    #[test]
    fn rejects_zero_weight() {
        let err = ConsistentHasher::new([("a", 0)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidKey);
    }

    #[test]
    fn single_node_always_wins() {
        let hasher = ConsistentHasher::new([("only", 1)]).unwrap();
        assert_eq!(*hasher.node_for(b"anything"), "only");
    }

    #[test]
    fn lookup_is_stable_across_calls() {
        let hasher = ConsistentHasher::new([("a", 1), ("b", 3)]).unwrap();
        let first = hasher.index_for(b"foo");
        for _ in 0..10 {
            assert_eq!(hasher.index_for(b"foo"), first);
        }
    }

    #[test]
    fn weighted_distribution_is_within_tolerance() {
        let hasher = ConsistentHasher::new([("a", 1), ("b", 3)]).unwrap();
        let mut a = 0usize;
        let mut b = 0usize;
        for i in 0..100_000u32 {
            let key = format!("key-{i}");
            match *hasher.node_for(key.as_bytes()) {
                "a" => a += 1,
                "b" => b += 1,
                _ => unreachable!(),
            }
        }
        let ratio = a as f64 / b as f64;
        // Expect a:b ~= 1:3, i.e. ratio ~= 0.333, within 3%.
        assert!((ratio - 1.0 / 3.0).abs() < 0.03, "ratio was {ratio}");
    }

    proptest! {
        #[test]
        fn index_is_always_in_range(key in proptest::collection::vec(any::<u8>(), 0..64)) {
            let hasher = ConsistentHasher::new([("a", 1), ("b", 3), ("c", 2)]).unwrap();
            let idx = hasher.index_for(&key);
            prop_assert!(idx < hasher.total_weight());
        }

        #[test]
        fn lookup_is_deterministic(key in proptest::collection::vec(any::<u8>(), 0..64)) {
            let hasher = ConsistentHasher::new([("a", 1), ("b", 3)]).unwrap();
            prop_assert_eq!(hasher.index_for(&key), hasher.index_for(&key));
        }
    }
}
