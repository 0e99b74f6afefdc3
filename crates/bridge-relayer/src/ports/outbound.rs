//! # Outbound Ports
//!
//! Capabilities provided by the surrounding tooling: chain RPC clients,
//! the encrypted contract channel, and the contracts the relayer feeds.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{
    BtcHeader, Commit, ConsensusHeader, Hash, HashChainEntry, LightBlock, RelayerError,
    TmMerkleProof, TxResponse, TxResult, ValidatorSet,
};

/// Bitcoin node RPC.
#[async_trait]
pub trait BtcChainRpc: Send + Sync {
    /// Hash of the node's best block.
    async fn best_block_hash(&self) -> Result<Hash, RelayerError>;

    /// Header by block hash.
    async fn header(&self, hash: &Hash) -> Result<BtcHeader, RelayerError>;

    /// Height of a block.
    async fn header_height(&self, hash: &Hash) -> Result<u64, RelayerError>;

    /// Transaction ids of a block, in block order.
    async fn block_txids(&self, hash: &Hash) -> Result<Vec<Hash>, RelayerError>;
}

/// Consensus chain RPC.
#[async_trait]
pub trait ConsensusChainRpc: Send + Sync {
    /// Latest height the node knows.
    async fn latest_height(&self) -> Result<u64, RelayerError>;

    /// Header at a height.
    async fn header(&self, height: u64) -> Result<ConsensusHeader, RelayerError>;

    /// Header by block hash.
    async fn header_by_hash(&self, hash: &Hash) -> Result<ConsensusHeader, RelayerError>;

    /// Commit for the block at `height`.
    ///
    /// Nodes only serve it once `height + 1` exists.
    async fn commit(&self, height: u64) -> Result<Commit, RelayerError>;

    /// Full validator set that signed `height`.
    async fn validator_set(&self, height: u64) -> Result<ValidatorSet, RelayerError>;

    /// Transaction results of the block at `height`.
    async fn block_results(&self, height: u64) -> Result<Vec<TxResult>, RelayerError>;
}

/// Selects a sender's past executions against one contract action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxFilter {
    /// Contract address
    pub contract: String,
    /// Sender address
    pub sender: String,
    /// Top-level key of the execute message
    pub action: String,
}

/// Encrypted query/execute channel to the target chain.
///
/// Messages arrive already padded; the channel encrypts, sends and decrypts
/// the answer.
#[async_trait]
pub trait EncryptedChannel: Send + Sync {
    /// Address that signs executions.
    fn sender(&self) -> &str;

    /// Submit a state-changing message.
    async fn execute(
        &self,
        contract: &str,
        msg: Value,
        gas: Option<u64>,
    ) -> Result<TxResponse, RelayerError>;

    /// Run a read-only query.
    async fn query(&self, contract: &str, msg: Value) -> Result<Value, RelayerError>;

    /// Recent transactions matching a filter, newest first.
    async fn recent_txs(&self, filter: &TxFilter) -> Result<Vec<TxResponse>, RelayerError>;
}

/// On-chain Bitcoin light client.
#[async_trait]
pub trait BtcLightClient: Send + Sync {
    /// Hash of the best header the contract holds.
    async fn best_header_hash(&self) -> Result<Hash, RelayerError>;

    /// Height of the contract's best header.
    async fn best_height(&self) -> Result<u64, RelayerError>;

    /// Hash the contract holds at `height` on its best chain.
    async fn header_hash_at(&self, height: u64) -> Result<Option<Hash>, RelayerError>;

    /// Append headers on top of the header at `tip_height`.
    async fn submit_headers(
        &self,
        tip_height: u64,
        headers: &[BtcHeader],
        gas: Option<u64>,
    ) -> Result<TxResponse, RelayerError>;

    /// Gas used by this relayer's most recent successful submission.
    async fn last_submission_gas(&self) -> Result<Option<u64>, RelayerError>;
}

/// On-chain consensus light client.
#[async_trait]
pub trait ConsensusLightClient: Send + Sync {
    /// Hash of the newest header the contract trusts.
    async fn best_committed_hash(&self) -> Result<Hash, RelayerError>;

    /// Height of the newest trusted header.
    async fn current_height(&self) -> Result<u64, RelayerError>;

    /// Submit light blocks that follow `prev`.
    async fn submit_light_blocks(
        &self,
        prev: &ConsensusHeader,
        blocks: &[LightBlock],
    ) -> Result<TxResponse, RelayerError>;

    /// Have the contract check a run of light blocks following `prev` and
    /// return the hash chain it attests to.
    async fn verify_light_blocks(
        &self,
        prev: &ConsensusHeader,
        blocks: &[LightBlock],
    ) -> Result<Vec<HashChainEntry>, RelayerError>;

    /// Check a transaction result against the results root committed at `height`.
    async fn verify_inclusion(
        &self,
        height: u64,
        leaf: &[u8],
        proof: &TmMerkleProof,
    ) -> Result<bool, RelayerError>;
}

/// Secondary contract that stores hash chains attested by the light client.
#[async_trait]
pub trait RelayContract: Send + Sync {
    /// Height of the newest stored hash.
    async fn best_height(&self) -> Result<u64, RelayerError>;

    /// Newest stored hash.
    async fn best_hash(&self) -> Result<Hash, RelayerError>;

    /// Store an attested hash chain in one call.
    async fn submit_hash_chain(&self, chain: &[HashChainEntry]) -> Result<TxResponse, RelayerError>;
}
