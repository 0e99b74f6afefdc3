//! # Domain Value Objects
//!
//! Merkle trees, proofs and their wire forms.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::errors::{Hash, RelayerError};

/// Position of a node in a Bitcoin-style tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreePosition {
    /// Level, 0 = leaves.
    pub height: usize,
    /// Index within the level.
    pub index: usize,
}

impl TreePosition {
    /// Leaf position.
    pub fn leaf(index: usize) -> Self {
        Self { height: 0, index }
    }

    /// Parent position.
    pub fn parent(&self) -> Self {
        Self {
            height: self.height + 1,
            index: self.index / 2,
        }
    }

    /// Index of the sibling within the same level.
    pub fn sibling_index(&self) -> usize {
        self.index ^ 1
    }

    /// Whether the sibling sits to the left of this node.
    pub fn sibling_is_left(&self) -> bool {
        self.index % 2 == 1
    }
}

/// Bitcoin-style merkle tree.
///
/// `levels[0]` holds the leaves; each following level halves (rounding up)
/// until a single root remains. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BtcMerkleTree {
    pub(crate) levels: Vec<Vec<Hash>>,
}

impl BtcMerkleTree {
    /// The root hash.
    pub fn root(&self) -> Hash {
        // `build` never produces an empty tree.
        self.levels[self.levels.len() - 1][0]
    }

    /// Leaves in order.
    pub fn leaves(&self) -> &[Hash] {
        &self.levels[0]
    }

    /// Number of levels including leaves and root.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Node at a position, if it exists.
    pub fn node(&self, pos: TreePosition) -> Option<&Hash> {
        self.levels.get(pos.height).and_then(|level| level.get(pos.index))
    }
}

/// Bitcoin-style inclusion proof.
///
/// `siblings[0]` is the leaf itself and `prefix[i]` is true when
/// `siblings[i + 1]` is combined on the left at step `i`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcMerkleProof {
    /// The proven leaf.
    #[serde(with = "hex::serde")]
    pub leaf: Hash,
    /// Leaf followed by one sibling per level.
    pub siblings: Vec<Hash>,
    /// Left/right flag per combine step.
    pub prefix: Vec<bool>,
}

/// Wire form expected by the Bitcoin light-client contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcMerkleProofWire {
    /// Leaf as reversed lowercase hex.
    pub leaf: String,
    /// Siblings as reversed lowercase hex.
    pub siblings: Vec<String>,
    /// Left/right flags.
    pub prefix: Vec<bool>,
}

/// Render a hash in Bitcoin display order (byte-reversed, lowercase hex).
pub fn to_display_hex(hash: &Hash) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Parse a hash from Bitcoin display order.
pub fn from_display_hex(s: &str) -> Result<Hash, RelayerError> {
    let mut hash = [0u8; 32];
    hex::decode_to_slice(s, &mut hash).map_err(|e| RelayerError::Serialization(e.to_string()))?;
    hash.reverse();
    Ok(hash)
}

impl BtcMerkleProof {
    /// Convert to the contract's wire form.
    pub fn to_wire(&self) -> BtcMerkleProofWire {
        BtcMerkleProofWire {
            leaf: to_display_hex(&self.leaf),
            siblings: self.siblings.iter().map(to_display_hex).collect(),
            prefix: self.prefix.clone(),
        }
    }

    /// Parse the contract's wire form.
    pub fn from_wire(wire: &BtcMerkleProofWire) -> Result<Self, RelayerError> {
        Ok(Self {
            leaf: from_display_hex(&wire.leaf)?,
            siblings: wire
                .siblings
                .iter()
                .map(|s| from_display_hex(s))
                .collect::<Result<_, _>>()?,
            prefix: wire.prefix.clone(),
        })
    }
}

/// Tendermint-style inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmMerkleProof {
    /// Leaf count when the proof was built.
    pub total: u64,
    /// Leaf index.
    pub index: u64,
    /// Domain-separated hash of the leaf.
    #[serde(with = "hex::serde")]
    pub leaf_hash: Hash,
    /// Sibling subtree roots, nearest the leaf first.
    pub aunts: Vec<Hash>,
}

/// Wire form expected by the consensus light-client contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmMerkleProofWire {
    /// Leaf count.
    pub total: u64,
    /// Leaf index.
    pub index: u64,
    /// Base64 leaf hash.
    pub leaf_hash: String,
    /// Base64 aunts.
    pub aunts: Vec<String>,
}

impl TmMerkleProof {
    /// Convert to the contract's wire form.
    pub fn to_wire(&self) -> TmMerkleProofWire {
        TmMerkleProofWire {
            total: self.total,
            index: self.index,
            leaf_hash: STANDARD.encode(self.leaf_hash),
            aunts: self.aunts.iter().map(|a| STANDARD.encode(a)).collect(),
        }
    }

    /// Parse the contract's wire form.
    pub fn from_wire(wire: &TmMerkleProofWire) -> Result<Self, RelayerError> {
        let decode = |s: &str| -> Result<Hash, RelayerError> {
            let bytes = STANDARD
                .decode(s)
                .map_err(|e| RelayerError::Serialization(e.to_string()))?;
            bytes.try_into().map_err(|b: Vec<u8>| {
                RelayerError::Serialization(format!("expected 32 bytes, got {}", b.len()))
            })
        };

        Ok(Self {
            total: wire.total,
            index: wire.index,
            leaf_hash: decode(&wire.leaf_hash)?,
            aunts: wire
                .aunts
                .iter()
                .map(|a| decode(a))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// One link of a hash chain attested by the consensus light client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashChainEntry {
    /// Block height.
    pub height: u64,
    /// Header hash at that height.
    #[serde(with = "hex::serde")]
    pub hash: Hash,
}

/// Outcome of one sync cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Engine that produced the report.
    pub engine: String,
    /// Headers or light blocks accepted this cycle.
    pub submitted: usize,
    /// Contract calls made this cycle.
    pub batches: usize,
    /// Network height examined up to.
    pub checked_height: u64,
}

impl SyncReport {
    /// An empty report for an engine.
    pub fn idle(engine: &str, checked_height: u64) -> Self {
        Self {
            engine: engine.to_string(),
            checked_height,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_parent() {
        let pos = TreePosition::leaf(5);
        assert_eq!(pos.parent(), TreePosition { height: 1, index: 2 });
        assert_eq!(pos.parent().parent(), TreePosition { height: 2, index: 1 });
    }

    #[test]
    fn test_position_sibling() {
        assert_eq!(TreePosition::leaf(4).sibling_index(), 5);
        assert!(!TreePosition::leaf(4).sibling_is_left());
        assert_eq!(TreePosition::leaf(5).sibling_index(), 4);
        assert!(TreePosition::leaf(5).sibling_is_left());
    }

    #[test]
    fn test_display_hex_is_reversed_lowercase() {
        let mut hash = [0u8; 32];
        hash[0] = 0xAB;
        let s = to_display_hex(&hash);
        assert!(s.ends_with("ab"));
        assert_eq!(from_display_hex(&s).unwrap(), hash);
    }

    #[test]
    fn test_btc_proof_wire() {
        let proof = BtcMerkleProof {
            leaf: [1u8; 32],
            siblings: vec![[1u8; 32], [2u8; 32]],
            prefix: vec![true],
        };
        let wire = proof.to_wire();
        assert_eq!(wire.siblings[1], "02".repeat(32));
        assert_eq!(BtcMerkleProof::from_wire(&wire).unwrap(), proof);
    }

    #[test]
    fn test_tm_proof_wire_rejects_short_hash() {
        let wire = TmMerkleProofWire {
            total: 1,
            index: 0,
            leaf_hash: STANDARD.encode([0u8; 31]),
            aunts: vec![],
        };
        assert!(matches!(
            TmMerkleProof::from_wire(&wire),
            Err(RelayerError::Serialization(_))
        ));
    }
}
