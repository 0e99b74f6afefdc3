//! # Tendermint Merkle Engine
//!
//! RFC 6962 style tree: a list of `n` leaves is split at the largest power
//! of two strictly below `n`, and each half is hashed recursively with
//! `0x00`/`0x01` domain separation. The same [`split_point`] drives root
//! computation, proof construction and proof verification.

use prost::Message;

use crate::algorithms::hashing::{empty_hash, inner_hash, leaf_hash};
use crate::domain::{invariant_tm_proof_index, Hash, RelayerError, TmMerkleProof, TxResult};

/// Largest power of two strictly less than `n`; `split_point(1) == 0`.
pub fn split_point(n: usize) -> usize {
    if n < 1 {
        return 0;
    }
    let bit_len = usize::BITS - n.leading_zeros();
    let k = 1usize << (bit_len - 1);
    if k == n {
        k >> 1
    } else {
        k
    }
}

/// Root over raw leaf values.
pub fn merkle_root<T: AsRef<[u8]>>(leaves: &[T]) -> Hash {
    match leaves.len() {
        0 => empty_hash(),
        1 => leaf_hash(leaves[0].as_ref()),
        n => {
            let k = split_point(n);
            let left = merkle_root(&leaves[..k]);
            let right = merkle_root(&leaves[k..]);
            inner_hash(&left, &right)
        }
    }
}

/// Build an inclusion proof for `leaves[index]`.
pub fn build_proof<T: AsRef<[u8]>>(leaves: &[T], index: usize) -> Result<TmMerkleProof, RelayerError> {
    if index >= leaves.len() {
        return Err(RelayerError::IndexOutOfRange {
            index,
            total: leaves.len(),
        });
    }

    let mut aunts = Vec::new();
    let leaf = proof_path(leaves, index, &mut aunts);

    Ok(TmMerkleProof {
        total: leaves.len() as u64,
        index: index as u64,
        leaf_hash: leaf,
        aunts,
    })
}

/// Recurse toward `index`, pushing the opposite half's root on the way back
/// up so aunts end in leaf-to-root order. Returns the leaf hash.
fn proof_path<T: AsRef<[u8]>>(leaves: &[T], index: usize, aunts: &mut Vec<Hash>) -> Hash {
    if leaves.len() == 1 {
        return leaf_hash(leaves[0].as_ref());
    }

    let k = split_point(leaves.len());
    if index < k {
        let leaf = proof_path(&leaves[..k], index, aunts);
        aunts.push(merkle_root(&leaves[k..]));
        leaf
    } else {
        let leaf = proof_path(&leaves[k..], index - k, aunts);
        aunts.push(merkle_root(&leaves[..k]));
        leaf
    }
}

/// Recompute the root a proof implies.
///
/// Any mismatch between `total`, `index` and the aunt count is reported as
/// [`RelayerError::InvalidProof`].
pub fn compute_root(proof: &TmMerkleProof) -> Result<Hash, RelayerError> {
    invariant_tm_proof_index(proof)?;

    root_from_aunts(proof.index, proof.total, proof.leaf_hash, &proof.aunts).ok_or_else(|| {
        RelayerError::InvalidProof(format!(
            "{} aunts do not fit index {} of {}",
            proof.aunts.len(),
            proof.index,
            proof.total
        ))
    })
}

fn root_from_aunts(index: u64, total: u64, leaf: Hash, aunts: &[Hash]) -> Option<Hash> {
    if index >= total {
        return None;
    }
    match total {
        0 => None,
        1 => aunts.is_empty().then_some(leaf),
        _ => {
            let (last, rest) = aunts.split_last()?;
            let k = split_point(total as usize) as u64;
            if index < k {
                let left = root_from_aunts(index, k, leaf, rest)?;
                Some(inner_hash(&left, last))
            } else {
                let right = root_from_aunts(index - k, total - k, leaf, rest)?;
                Some(inner_hash(last, &right))
            }
        }
    }
}

/// Check that `leaf` is included under `root`.
pub fn verify(proof: &TmMerkleProof, root: &Hash, leaf: &[u8]) -> Result<(), RelayerError> {
    if leaf_hash(leaf) != proof.leaf_hash {
        return Err(RelayerError::InvalidProof("leaf hash mismatch".to_string()));
    }
    if compute_root(proof)? != *root {
        return Err(RelayerError::InvalidProof("root mismatch".to_string()));
    }
    Ok(())
}

/// Deterministic subset of a transaction result, as committed on chain.
#[derive(Clone, PartialEq, Message)]
struct DeterministicTxResult {
    #[prost(uint32, tag = "1")]
    code: u32,
    #[prost(bytes = "vec", tag = "2")]
    data: Vec<u8>,
    #[prost(int64, tag = "5")]
    gas_wanted: i64,
    #[prost(int64, tag = "6")]
    gas_used: i64,
}

/// Canonical leaf encoding of a transaction result.
///
/// Only `code`, `data`, `gas_wanted` and `gas_used` are kept; log, info,
/// events and codespace are zeroed.
pub fn encode_tx_result(result: &TxResult) -> Vec<u8> {
    DeterministicTxResult {
        code: result.code,
        data: result.data.clone(),
        gas_wanted: result.gas_wanted,
        gas_used: result.gas_used,
    }
    .encode_to_vec()
}

/// Results root of a block, as stored in the next header's `last_results_hash`.
pub fn results_root(results: &[TxResult]) -> Hash {
    let leaves: Vec<Vec<u8>> = results.iter().map(encode_tx_result).collect();
    merkle_root(&leaves)
}

/// Prove that `results[index]` is part of the block's results root.
pub fn prove_tx_result(
    results: &[TxResult],
    index: usize,
) -> Result<(Hash, TmMerkleProof), RelayerError> {
    let leaves: Vec<Vec<u8>> = results.iter().map(encode_tx_result).collect();
    let proof = build_proof(&leaves, index)?;
    Ok((merkle_root(&leaves), proof))
}
