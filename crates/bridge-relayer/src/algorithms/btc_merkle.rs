//! # Bitcoin Merkle Engine
//!
//! Transaction merkle tree as computed by Bitcoin: pairwise double-SHA256,
//! with the last node of an odd level paired with itself.
//!
//! # Algorithm
//!
//! 1. Level 0 holds the leaves (txids, internal byte order)
//! 2. Each next level hashes adjacent pairs, duplicating an odd tail
//! 3. Stop when a level holds a single hash: the root
//!
//! # Time Complexity: O(n) build, O(log n) prove/verify

use crate::algorithms::hashing::btc_hash_pair;
use crate::domain::{
    invariant_btc_proof_shape, BtcMerkleProof, BtcMerkleTree, Hash, RelayerError, TreePosition,
};

/// Build a tree from leaves.
pub fn build(leaves: &[Hash]) -> Result<BtcMerkleTree, RelayerError> {
    if leaves.is_empty() {
        return Err(RelayerError::EmptyLeafSet);
    }

    let mut levels = vec![leaves.to_vec()];

    while levels[levels.len() - 1].len() > 1 {
        let level = &levels[levels.len() - 1];
        let mut next_level = Vec::with_capacity(level.len().div_ceil(2));

        for chunk in level.chunks(2) {
            let left = &chunk[0];
            let right = chunk.get(1).unwrap_or(left); // Duplicate last if odd
            next_level.push(btc_hash_pair(left, right));
        }

        levels.push(next_level);
    }

    Ok(BtcMerkleTree { levels })
}

/// Build an inclusion proof for `leaf`.
///
/// The leaf is located by value; the first match wins.
pub fn prove_inclusion(tree: &BtcMerkleTree, leaf: &Hash) -> Result<BtcMerkleProof, RelayerError> {
    let index = tree
        .leaves()
        .iter()
        .position(|l| l == leaf)
        .ok_or_else(|| RelayerError::LeafNotFound(hex::encode(leaf)))?;

    let mut siblings = vec![*leaf];
    let mut prefix = Vec::with_capacity(tree.depth().saturating_sub(1));
    let mut pos = TreePosition::leaf(index);

    // Every level except the root contributes one sibling.
    while pos.height + 1 < tree.depth() {
        let sibling_pos = TreePosition {
            index: pos.sibling_index(),
            ..pos
        };
        // an odd tail is paired with itself
        let sibling = tree
            .node(sibling_pos)
            .or_else(|| tree.node(pos))
            .ok_or_else(|| RelayerError::Inconsistent(format!("no node at {pos:?}")))?;
        siblings.push(*sibling);
        prefix.push(pos.sibling_is_left());
        pos = pos.parent();
    }

    Ok(BtcMerkleProof {
        leaf: *leaf,
        siblings,
        prefix,
    })
}

/// Replay a proof and return the root it implies.
///
/// Callers compare the result with a chain-asserted root.
pub fn verify(proof: &BtcMerkleProof) -> Result<Hash, RelayerError> {
    invariant_btc_proof_shape(proof)?;

    let mut current = proof.siblings[0];
    for (is_left, sibling) in proof.prefix.iter().zip(&proof.siblings[1..]) {
        current = if *is_left {
            btc_hash_pair(sibling, &current)
        } else {
            btc_hash_pair(&current, sibling)
        };
    }

    Ok(current)
}

/// Root of a leaf set, without keeping the tree.
pub fn compute_root(leaves: &[Hash]) -> Result<Hash, RelayerError> {
    Ok(build(leaves)?.root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Helper to create deterministic hash
    fn make_hash(n: u8) -> Hash {
        let mut h = [0u8; 32];
        h[0] = n;
        h
    }

    #[test]
    fn test_build_empty() {
        assert!(matches!(build(&[]), Err(RelayerError::EmptyLeafSet)));
    }

    #[test]
    fn test_build_single() {
        let tx = make_hash(42);
        let tree = build(&[tx]).unwrap();
        assert_eq!(tree.root(), tx);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_build_four() {
        let txs: Vec<Hash> = (1..=4).map(make_hash).collect();
        let tree = build(&txs).unwrap();

        let left = btc_hash_pair(&txs[0], &txs[1]);
        let right = btc_hash_pair(&txs[2], &txs[3]);
        assert_eq!(tree.root(), btc_hash_pair(&left, &right));
    }

    #[test]
    fn test_odd_leaf_pairs_with_itself() {
        let txs: Vec<Hash> = (1..=3).map(make_hash).collect();
        let tree = build(&txs).unwrap();

        let left = btc_hash_pair(&txs[0], &txs[1]);
        let right = btc_hash_pair(&txs[2], &txs[2]);
        assert_eq!(tree.root(), btc_hash_pair(&left, &right));
        assert_eq!(tree.levels[1].len(), 2);
        assert_eq!(tree.node(TreePosition::leaf(3)), None);
        assert_eq!(tree.node(TreePosition { height: 1, index: 1 }), Some(&right));
    }

    #[test]
    fn test_level_lengths_halve_rounding_up() {
        let txs: Vec<Hash> = (0..11).map(make_hash).collect();
        let tree = build(&txs).unwrap();
        let lengths: Vec<usize> = tree.levels.iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![11, 6, 3, 2, 1]);
    }

    #[test]
    fn test_proof_prefix_for_third_of_four() {
        let txs: Vec<Hash> = (1..=4).map(make_hash).collect();
        let tree = build(&txs).unwrap();

        let proof = prove_inclusion(&tree, &txs[2]).unwrap();
        assert_eq!(proof.prefix, vec![false, true]);
        assert_eq!(proof.siblings[0], txs[2]);
        assert_eq!(proof.siblings[1], txs[3]);
        assert_eq!(proof.siblings[2], btc_hash_pair(&txs[0], &txs[1]));

        let rebuilt = build(&txs).unwrap();
        assert_eq!(verify(&proof).unwrap(), rebuilt.root());
    }

    #[test]
    fn test_proof_odd_tail_self_pairs() {
        let txs: Vec<Hash> = (1..=5).map(make_hash).collect();
        let tree = build(&txs).unwrap();

        let proof = prove_inclusion(&tree, &txs[4]).unwrap();
        assert_eq!(proof.siblings[1], txs[4]);
        assert_eq!(verify(&proof).unwrap(), tree.root());
    }

    #[test]
    fn test_single_leaf_proof() {
        let tx = make_hash(9);
        let tree = build(&[tx]).unwrap();
        let proof = prove_inclusion(&tree, &tx).unwrap();
        assert!(proof.prefix.is_empty());
        assert_eq!(verify(&proof).unwrap(), tx);
    }

    #[test]
    fn test_leaf_not_found() {
        let txs: Vec<Hash> = (1..=4).map(make_hash).collect();
        let tree = build(&txs).unwrap();
        assert!(matches!(
            prove_inclusion(&tree, &make_hash(99)),
            Err(RelayerError::LeafNotFound(_))
        ));
    }

    #[test]
    fn test_verify_tampered_sibling() {
        let txs: Vec<Hash> = (1..=4).map(make_hash).collect();
        let tree = build(&txs).unwrap();

        let mut proof = prove_inclusion(&tree, &txs[1]).unwrap();
        proof.siblings[1] = make_hash(99);
        assert_ne!(verify(&proof).unwrap(), tree.root());
    }

    #[test]
    fn test_verify_rejects_mismatched_lengths() {
        let proof = BtcMerkleProof {
            leaf: make_hash(1),
            siblings: vec![make_hash(1), make_hash(2)],
            prefix: vec![],
        };
        assert!(matches!(
            verify(&proof),
            Err(RelayerError::ProofShapeMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_every_leaf_proves_to_root(count in 1usize..64) {
            let txs: Vec<Hash> = (0..count)
                .map(|i| {
                    let mut h = [0u8; 32];
                    h[..8].copy_from_slice(&(i as u64).to_le_bytes());
                    h
                })
                .collect();
            let tree = build(&txs).unwrap();

            for tx in &txs {
                let proof = prove_inclusion(&tree, tx).unwrap();
                prop_assert_eq!(verify(&proof).unwrap(), tree.root());
            }
        }
    }
}
