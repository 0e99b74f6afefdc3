//! # Hash Primitives
//!
//! Chain-specific hashing:
//! - Bitcoin: double SHA-256, no domain separation.
//! - Consensus chain: single SHA-256 with a `0x00` prefix for leaves and
//!   `0x01` for inner nodes.

use sha2::{Digest, Sha256};

use crate::domain::Hash;

/// Leaf prefix for consensus-chain merkle trees.
pub const LEAF_PREFIX: u8 = 0x00;

/// Inner-node prefix for consensus-chain merkle trees.
pub const INNER_PREFIX: u8 = 0x01;

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Double SHA-256.
pub fn sha256d(data: &[u8]) -> Hash {
    sha256(&sha256(data))
}

/// Bitcoin inner node: `sha256d(left || right)`.
pub fn btc_hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    sha256d(&buf)
}

/// Consensus-chain leaf: `sha256(0x00 || leaf)`.
pub fn leaf_hash(leaf: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(leaf);
    hasher.finalize().into()
}

/// Consensus-chain inner node: `sha256(0x01 || left || right)`.
pub fn inner_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([INNER_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Root of an empty consensus-chain tree.
pub fn empty_hash() -> Hash {
    leaf_hash(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256d_is_double() {
        assert_eq!(sha256d(b"hello"), sha256(&sha256(b"hello")));
    }

    #[test]
    fn test_leaf_and_inner_are_domain_separated() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let mut concat = Vec::new();
        concat.extend_from_slice(&a);
        concat.extend_from_slice(&b);
        assert_ne!(inner_hash(&a, &b), leaf_hash(&concat));
    }

    #[test]
    fn test_empty_hash_is_leaf_of_empty() {
        let mut hasher = Sha256::new();
        hasher.update([0x00]);
        let expected: Hash = hasher.finalize().into();
        assert_eq!(empty_hash(), expected);
    }

    #[test]
    fn test_btc_hash_pair_order_matters() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(btc_hash_pair(&a, &b), btc_hash_pair(&b, &a));
    }
}
