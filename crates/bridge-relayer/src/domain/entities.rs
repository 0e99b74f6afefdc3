//! # Domain Entities
//!
//! Headers, light blocks and per-engine sync state.
//!
//! Headers are immutable facts once fetched from a chain RPC; engines copy
//! them around but never mutate them.

use super::errors::{Hash, RelayerError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Serialized Bitcoin block header length.
pub const BTC_HEADER_LEN: usize = 80;

/// Bitcoin block header.
///
/// Only the link fields are interpreted; proof-of-work fields stay inside
/// `raw` and are checked by the on-chain light client.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BtcHeader {
    /// Double-SHA256 of `raw`.
    #[serde(with = "hex::serde")]
    pub hash: Hash,
    /// Hash of the parent block.
    #[serde(with = "hex::serde")]
    pub prev_hash: Hash,
    /// Transaction merkle root.
    #[serde(with = "hex::serde")]
    pub merkle_root: Hash,
    /// The 80-byte consensus serialization.
    #[serde(with = "hex::serde")]
    pub raw: Vec<u8>,
}

impl BtcHeader {
    /// Parse a consensus-serialized header.
    pub fn from_raw(raw: &[u8]) -> Result<Self, RelayerError> {
        if raw.len() != BTC_HEADER_LEN {
            return Err(RelayerError::Serialization(format!(
                "bitcoin header must be {} bytes, got {}",
                BTC_HEADER_LEN,
                raw.len()
            )));
        }

        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&raw[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&raw[36..68]);

        Ok(Self {
            hash: crate::algorithms::hashing::sha256d(raw),
            prev_hash,
            merkle_root,
            raw: raw.to_vec(),
        })
    }
}

/// Consensus-chain block header (the fields this relayer reads).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsensusHeader {
    /// Block height.
    pub height: u64,
    /// Header hash.
    #[serde(with = "hex::serde")]
    pub hash: Hash,
    /// Hash of the validator set that signs this block.
    #[serde(with = "hex::serde")]
    pub validators_hash: Hash,
    /// Hash of the validator set for the next block.
    #[serde(with = "hex::serde")]
    pub next_validators_hash: Hash,
    /// Merkle root of the previous block's transaction results.
    #[serde(with = "hex::serde")]
    pub last_results_hash: Hash,
}

/// One validator's vote inside a commit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitSig {
    /// Validator address.
    #[serde(with = "hex::serde")]
    pub validator_address: Vec<u8>,
    /// Signature bytes (empty for absent votes).
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    /// Vote timestamp in unix nanoseconds.
    pub timestamp_nanos: i64,
}

/// Aggregated votes for a header.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    /// Height of the committed header.
    pub height: u64,
    /// Consensus round.
    pub round: u32,
    /// Hash of the committed header.
    #[serde(with = "hex::serde")]
    pub block_hash: Hash,
    /// Votes.
    pub signatures: Vec<CommitSig>,
}

/// A single validator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Validator {
    /// Validator address.
    #[serde(with = "hex::serde")]
    pub address: Vec<u8>,
    /// Public key bytes.
    #[serde(with = "hex::serde")]
    pub pub_key: Vec<u8>,
    /// Voting power.
    pub voting_power: u64,
}

/// Validator set at a height.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorSet {
    /// Validators, in the chain's canonical order.
    pub validators: Vec<Validator>,
}

impl ValidatorSet {
    /// Sum of voting power.
    pub fn total_power(&self) -> u64 {
        self.validators.iter().map(|v| v.voting_power).sum()
    }
}

/// Header plus the commit that signs it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedHeader {
    /// The header.
    pub header: ConsensusHeader,
    /// Votes for the header.
    pub commit: Commit,
}

/// Unit submitted to the consensus light-client contract.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LightBlock {
    /// Signed header.
    pub signed_header: SignedHeader,
    /// Validator set at the header's height.
    pub validator_set: ValidatorSet,
}

impl LightBlock {
    /// Height of the wrapped header.
    pub fn height(&self) -> u64 {
        self.signed_header.header.height
    }

    /// Hash of the wrapped header.
    pub fn hash(&self) -> Hash {
        self.signed_header.header.hash
    }
}

/// Result of executing one transaction, as committed by the consensus engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxResult {
    /// Result code (0 = success).
    pub code: u32,
    /// Result data.
    pub data: Vec<u8>,
    /// Log output. Not part of the committed encoding.
    pub log: String,
    /// Extra info. Not part of the committed encoding.
    pub info: String,
    /// Gas requested.
    pub gas_wanted: i64,
    /// Gas consumed.
    pub gas_used: i64,
    /// Error namespace. Not part of the committed encoding.
    pub codespace: String,
}

/// Response to a state-mutating contract call.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxResponse {
    /// Transaction hash.
    pub tx_hash: String,
    /// On-chain result code (0 = success).
    pub code: u32,
    /// Raw log / error string.
    pub raw_log: String,
    /// Gas requested.
    pub gas_wanted: u64,
    /// Gas consumed.
    pub gas_used: u64,
}

impl TxResponse {
    /// Whether the chain accepted the transaction.
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Sync state for one chain pair, owned by exactly one engine.
#[derive(Clone, Debug)]
pub struct SyncState<H> {
    /// Highest network height already examined.
    checked_height: u64,
    /// Best header the contract has committed, as last observed.
    pub contract_best_header: Option<H>,
    /// Best header the network reported, as last observed.
    pub network_best_header: Option<H>,
    /// Largest allowed height gap between trusted updates.
    pub max_interval: u64,
    /// Headers selected for submission but not yet committed.
    pub pending_headers: VecDeque<H>,
    /// Highest height ever queued, used to avoid reprocessing.
    pub last_seen_height: u64,
}

impl<H> SyncState<H> {
    /// Create a fresh state.
    pub fn new(max_interval: u64) -> Self {
        Self {
            checked_height: 0,
            contract_best_header: None,
            network_best_header: None,
            max_interval,
            pending_headers: VecDeque::new(),
            last_seen_height: 0,
        }
    }

    /// Highest network height already examined.
    pub fn checked_height(&self) -> u64 {
        self.checked_height
    }

    /// Move `checked_height` forward. Lower values are ignored.
    pub fn advance_checked(&mut self, height: u64) {
        if height > self.checked_height {
            self.checked_height = height;
        }
    }
}
