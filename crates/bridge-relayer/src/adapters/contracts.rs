//! # Contract Adapters
//!
//! JSON message implementations of the light-client and relay contract
//! ports, all routed through [`ContractClient`].
//!
//! Bitcoin hashes travel in display order (byte-reversed hex); consensus
//! hashes travel as plain lowercase hex.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::contract_client::ContractClient;
use crate::algorithms::leaf_hash;
use crate::domain::{
    from_display_hex, BtcHeader, ConsensusHeader, Hash, HashChainEntry, LightBlock, RelayerError,
    TmMerkleProof, TxResponse,
};
use crate::ports::{BtcLightClient, ConsensusLightClient, EncryptedChannel, RelayContract};

/// Execute action name for Bitcoin header submissions.
pub const SUBMIT_HEADERS_ACTION: &str = "submit_headers";

#[derive(Deserialize)]
struct BestHeaderAnswer {
    height: u64,
    hash: String,
}

#[derive(Deserialize)]
struct HeaderAtAnswer {
    hash: Option<String>,
}

#[derive(Deserialize)]
struct HashChainAnswer {
    chain: Vec<HashChainEntry>,
}

#[derive(Deserialize)]
struct InclusionAnswer {
    valid: bool,
}

fn parse_hash(s: &str) -> Result<Hash, RelayerError> {
    let mut hash = [0u8; 32];
    hex::decode_to_slice(s, &mut hash)
        .map_err(|e| RelayerError::Serialization(format!("bad hash {s}: {e}")))?;
    Ok(hash)
}

/// Bitcoin light-client contract.
pub struct BtcLightClientContract<C: EncryptedChannel> {
    client: ContractClient<C>,
}

impl<C: EncryptedChannel> BtcLightClientContract<C> {
    /// Wrap a client bound to the contract address.
    pub fn new(client: ContractClient<C>) -> Self {
        Self { client }
    }

    async fn best_header(&self) -> Result<BestHeaderAnswer, RelayerError> {
        self.client.query(json!({ "best_header": {} })).await
    }
}

#[async_trait]
impl<C: EncryptedChannel> BtcLightClient for BtcLightClientContract<C> {
    async fn best_header_hash(&self) -> Result<Hash, RelayerError> {
        from_display_hex(&self.best_header().await?.hash)
    }

    async fn best_height(&self) -> Result<u64, RelayerError> {
        Ok(self.best_header().await?.height)
    }

    async fn header_hash_at(&self, height: u64) -> Result<Option<Hash>, RelayerError> {
        let answer: HeaderAtAnswer = self
            .client
            .query(json!({ "header_at": { "height": height } }))
            .await?;
        answer.hash.as_deref().map(from_display_hex).transpose()
    }

    async fn submit_headers(
        &self,
        tip_height: u64,
        headers: &[BtcHeader],
        gas: Option<u64>,
    ) -> Result<TxResponse, RelayerError> {
        let raw: Vec<String> = headers.iter().map(|h| hex::encode(&h.raw)).collect();
        self.client
            .execute(
                json!({ (SUBMIT_HEADERS_ACTION): { "tip_height": tip_height, "headers": raw } }),
                gas,
            )
            .await
    }

    async fn last_submission_gas(&self) -> Result<Option<u64>, RelayerError> {
        let txs = self.client.recent_txs(SUBMIT_HEADERS_ACTION).await?;
        Ok(txs.iter().find(|tx| tx.is_success()).map(|tx| tx.gas_used))
    }
}

/// Consensus light-client contract.
pub struct ConsensusLightClientContract<C: EncryptedChannel> {
    client: ContractClient<C>,
}

impl<C: EncryptedChannel> ConsensusLightClientContract<C> {
    /// Wrap a client bound to the contract address.
    pub fn new(client: ContractClient<C>) -> Self {
        Self { client }
    }

    async fn best_header(&self) -> Result<BestHeaderAnswer, RelayerError> {
        self.client.query(json!({ "best_header": {} })).await
    }
}

#[async_trait]
impl<C: EncryptedChannel> ConsensusLightClient for ConsensusLightClientContract<C> {
    async fn best_committed_hash(&self) -> Result<Hash, RelayerError> {
        parse_hash(&self.best_header().await?.hash)
    }

    async fn current_height(&self) -> Result<u64, RelayerError> {
        Ok(self.best_header().await?.height)
    }

    async fn submit_light_blocks(
        &self,
        prev: &ConsensusHeader,
        blocks: &[LightBlock],
    ) -> Result<TxResponse, RelayerError> {
        self.client
            .execute(
                json!({ "submit_light_blocks": { "prev_header": prev, "blocks": blocks } }),
                None,
            )
            .await
    }

    async fn verify_light_blocks(
        &self,
        prev: &ConsensusHeader,
        blocks: &[LightBlock],
    ) -> Result<Vec<HashChainEntry>, RelayerError> {
        let answer: HashChainAnswer = self
            .client
            .query(json!({
                "verify_subsequent_light_blocks": { "prev_header": prev, "blocks": blocks }
            }))
            .await?;
        Ok(answer.chain)
    }

    async fn verify_inclusion(
        &self,
        height: u64,
        leaf: &[u8],
        proof: &TmMerkleProof,
    ) -> Result<bool, RelayerError> {
        if leaf_hash(leaf) != proof.leaf_hash {
            return Ok(false);
        }
        let answer: InclusionAnswer = self
            .client
            .query(json!({
                "verify_tx_result": { "height": height, "proof": proof.to_wire() }
            }))
            .await?;
        Ok(answer.valid)
    }
}

/// Relay contract storing attested consensus hash chains.
pub struct RelayHashContract<C: EncryptedChannel> {
    client: ContractClient<C>,
}

impl<C: EncryptedChannel> RelayHashContract<C> {
    /// Wrap a client bound to the contract address.
    pub fn new(client: ContractClient<C>) -> Self {
        Self { client }
    }

    async fn best(&self) -> Result<BestHeaderAnswer, RelayerError> {
        self.client.query(json!({ "best_hash": {} })).await
    }
}

#[async_trait]
impl<C: EncryptedChannel> RelayContract for RelayHashContract<C> {
    async fn best_height(&self) -> Result<u64, RelayerError> {
        Ok(self.best().await?.height)
    }

    async fn best_hash(&self) -> Result<Hash, RelayerError> {
        parse_hash(&self.best().await?.hash)
    }

    async fn submit_hash_chain(&self, chain: &[HashChainEntry]) -> Result<TxResponse, RelayerError> {
        self.client
            .execute(json!({ "append_hash_chain": { "chain": chain } }), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayerConfig;
    use crate::domain::to_display_hex;
    use crate::test_utils::MockChannel;
    use serde_json::Value;
    use std::sync::Arc;

    fn client(channel: &Arc<MockChannel>, address: &str) -> ContractClient<MockChannel> {
        ContractClient::new(Arc::clone(channel), address, RelayerConfig::for_testing().contract)
    }

    #[tokio::test]
    async fn test_btc_best_header_uses_display_order() {
        let channel = Arc::new(MockChannel::new());
        let mut hash = [0u8; 32];
        hash[0] = 0xab;
        let display = to_display_hex(&hash);
        channel.on_query("best_header", move |_| {
            Ok(json!({ "height": 800_000, "hash": display.clone() }))
        });

        let contract = BtcLightClientContract::new(client(&channel, "btc-lc"));
        assert_eq!(contract.best_header_hash().await.unwrap(), hash);
        assert_eq!(contract.best_height().await.unwrap(), 800_000);
    }

    #[tokio::test]
    async fn test_btc_header_hash_at_missing() {
        let channel = Arc::new(MockChannel::new());
        channel.on_query("header_at", |_| Ok(json!({ "hash": null })));

        let contract = BtcLightClientContract::new(client(&channel, "btc-lc"));
        assert_eq!(contract.header_hash_at(5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_btc_submit_headers_message() {
        let channel = Arc::new(MockChannel::new());
        let contract = BtcLightClientContract::new(client(&channel, "btc-lc"));
        let header = BtcHeader::from_raw(&[0u8; 80]).unwrap();

        contract.submit_headers(41, &[header], Some(5_000)).await.unwrap();

        let (msg, gas): (Value, Option<u64>) = channel.executions()[0].clone();
        assert_eq!(gas, Some(5_000));
        assert_eq!(msg["submit_headers"]["tip_height"], 41);
        assert_eq!(msg["submit_headers"]["headers"][0], "00".repeat(80));
    }

    #[tokio::test]
    async fn test_last_submission_gas_skips_failures() {
        let channel = Arc::new(MockChannel::new());
        channel.set_recent_txs(vec![
            TxResponse {
                code: 5,
                gas_used: 1,
                ..Default::default()
            },
            TxResponse {
                code: 0,
                gas_used: 210_000,
                ..Default::default()
            },
        ]);

        let contract = BtcLightClientContract::new(client(&channel, "btc-lc"));
        assert_eq!(contract.last_submission_gas().await.unwrap(), Some(210_000));

        let filter = channel.last_filter().unwrap();
        assert_eq!(filter.contract, "btc-lc");
        assert_eq!(filter.action, SUBMIT_HEADERS_ACTION);
        assert_eq!(filter.sender, channel.sender());
    }

    #[tokio::test]
    async fn test_last_submission_gas_without_history() {
        let channel = Arc::new(MockChannel::new());
        let contract = BtcLightClientContract::new(client(&channel, "btc-lc"));
        assert_eq!(contract.last_submission_gas().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_verify_light_blocks_decodes_chain() {
        let channel = Arc::new(MockChannel::new());
        channel.on_query("verify_subsequent_light_blocks", |_| {
            Ok(json!({ "chain": [
                { "height": 2, "hash": hex::encode([1u8; 32]) },
                { "height": 3, "hash": hex::encode([2u8; 32]) },
            ] }))
        });

        let contract = ConsensusLightClientContract::new(client(&channel, "tm-lc"));
        let prev = ConsensusHeader {
            height: 1,
            hash: [0; 32],
            validators_hash: [0; 32],
            next_validators_hash: [0; 32],
            last_results_hash: [0; 32],
        };
        let chain = contract.verify_light_blocks(&prev, &[]).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1], HashChainEntry { height: 3, hash: [2u8; 32] });
    }

    #[tokio::test]
    async fn test_verify_inclusion_rejects_wrong_leaf_locally() {
        let channel = Arc::new(MockChannel::new());
        let contract = ConsensusLightClientContract::new(client(&channel, "tm-lc"));
        let proof = crate::algorithms::tm_merkle::build_proof(&[b"a", b"b"], 0).unwrap();

        assert!(!contract.verify_inclusion(3, b"b", &proof).await.unwrap());
        assert!(channel.queries().is_empty());
    }

    #[tokio::test]
    async fn test_relay_submit_hash_chain() {
        let channel = Arc::new(MockChannel::new());
        let contract = RelayHashContract::new(client(&channel, "relay"));
        let entry = HashChainEntry {
            height: 9,
            hash: [7u8; 32],
        };
        contract.submit_hash_chain(&[entry]).await.unwrap();

        let (msg, _) = channel.executions()[0].clone();
        assert_eq!(msg["append_hash_chain"]["chain"][0]["height"], 9);
        assert_eq!(msg["append_hash_chain"]["chain"][0]["hash"], hex::encode([7u8; 32]));
    }
}
