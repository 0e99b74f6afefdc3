//! # Domain Invariants
//!
//! Constants and shape rules that must hold before any proof is replayed
//! or any batch is submitted.

use super::errors::RelayerError;
use super::value_objects::{BtcMerkleProof, TmMerkleProof};

/// Default number of Bitcoin headers per contract call.
pub const DEFAULT_BTC_BATCH_SIZE: usize = 10;

/// Default number of light blocks per relay submission.
pub const DEFAULT_CONSENSUS_BATCH_SIZE: usize = 5;

/// Default liveness bound between trusted consensus updates.
pub const DEFAULT_MAX_INTERVAL: u64 = 100;

/// Default walk-back bound when reconciling a Bitcoin fork.
pub const DEFAULT_MAX_WALK_BACK: u64 = 1_000;

/// Default padding block size for encrypted contract calls.
pub const DEFAULT_PADDING_BLOCK_SIZE: usize = 256;

/// Byte cost of injecting `,"p":""` into a non-empty JSON object.
pub const MIN_PADDING_SIZE: usize = 7;

/// Invariant: `siblings.len() == prefix.len() + 1` and `siblings[0] == leaf`.
pub fn invariant_btc_proof_shape(proof: &BtcMerkleProof) -> Result<(), RelayerError> {
    if proof.siblings.len() != proof.prefix.len() + 1 {
        return Err(RelayerError::ProofShapeMismatch {
            siblings: proof.siblings.len(),
            prefix: proof.prefix.len(),
        });
    }
    if proof.siblings[0] != proof.leaf {
        return Err(RelayerError::InvalidProof(
            "first sibling must be the leaf".to_string(),
        ));
    }
    Ok(())
}

/// Invariant: `0 <= index < total`.
pub fn invariant_tm_proof_index(proof: &TmMerkleProof) -> Result<(), RelayerError> {
    if proof.index >= proof.total {
        return Err(RelayerError::IndexOutOfRange {
            index: proof.index as usize,
            total: proof.total as usize,
        });
    }
    Ok(())
}

/// Invariant: batches are never empty and never zero-sized.
pub fn invariant_batch_size(batch_size: usize) -> Result<(), RelayerError> {
    if batch_size == 0 {
        return Err(RelayerError::InvalidMessage(
            "batch size must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btc_proof_shape_mismatch() {
        let proof = BtcMerkleProof {
            leaf: [1u8; 32],
            siblings: vec![[1u8; 32]],
            prefix: vec![true],
        };
        assert!(matches!(
            invariant_btc_proof_shape(&proof),
            Err(RelayerError::ProofShapeMismatch { siblings: 1, prefix: 1 })
        ));
    }

    #[test]
    fn test_btc_proof_first_sibling_is_leaf() {
        let proof = BtcMerkleProof {
            leaf: [1u8; 32],
            siblings: vec![[2u8; 32]],
            prefix: vec![],
        };
        assert!(invariant_btc_proof_shape(&proof).is_err());
    }

    #[test]
    fn test_tm_proof_index() {
        let mut proof = TmMerkleProof {
            total: 3,
            index: 2,
            leaf_hash: [0u8; 32],
            aunts: vec![],
        };
        assert!(invariant_tm_proof_index(&proof).is_ok());
        proof.index = 3;
        assert!(invariant_tm_proof_index(&proof).is_err());
    }

    #[test]
    fn test_batch_size() {
        assert!(invariant_batch_size(0).is_err());
        assert!(invariant_batch_size(1).is_ok());
    }
}
