//! # Bitcoin Header Sync
//!
//! Keeps the on-chain Bitcoin light client at the node's best header.
//!
//! Per cycle:
//! 1. Read contract best (hash, height) and chain best (hash, height).
//! 2. Equal hashes: nothing to do.
//! 3. Walk back from chain best through `prev_hash` until the walk meets
//!    the contract best (linear extension) or, at or below the contract's
//!    height, a header the contract already holds at that height (fork
//!    convergence). A node lagging behind the contract may find chain best
//!    itself already held, which leaves nothing to submit.
//! 4. Submit the collected headers oldest first in fixed-size batches, each
//!    at its running tip height.
//!
//! A failed batch aborts the cycle; earlier batches stay committed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::algorithms::{btc_merkle, estimate_gas, plan_batches, walk_stop, HeaderArena, WalkStop};
use crate::config::BtcSyncConfig;
use crate::domain::{
    to_display_hex, BtcHeader, BtcMerkleProof, Hash, RelayerError, SyncReport,
};
use crate::ports::{BtcChainRpc, BtcLightClient, SyncStrategy};
use crate::retry::ReadPolicy;

/// Engine label.
pub const BTC_ENGINE: &str = "btc-headers";

/// Headers to submit and the height they build on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderDelta {
    /// Height of the header the first collected header links to.
    pub tip_height: u64,
    /// Collected headers, oldest first.
    pub headers: Vec<BtcHeader>,
}

/// Bitcoin header sync engine.
pub struct BtcHeaderSync<R: BtcChainRpc, L: BtcLightClient> {
    rpc: Arc<R>,
    light_client: Arc<L>,
    config: BtcSyncConfig,
    policy: ReadPolicy,
    checked_height: u64,
}

impl<R: BtcChainRpc, L: BtcLightClient> BtcHeaderSync<R, L> {
    /// Create an engine.
    pub fn new(rpc: Arc<R>, light_client: Arc<L>, config: BtcSyncConfig, policy: ReadPolicy) -> Self {
        Self {
            rpc,
            light_client,
            config,
            policy,
            checked_height: 0,
        }
    }

    /// Compute what the contract is missing, without submitting.
    pub async fn compute_delta(&self) -> Result<Option<HeaderDelta>, RelayerError> {
        let contract_hash = self
            .policy
            .read("btc_lc.best_header_hash", || self.light_client.best_header_hash())
            .await?;
        let contract_height = self
            .policy
            .read("btc_lc.best_height", || self.light_client.best_height())
            .await?;
        let chain_hash = self
            .policy
            .read("btc.best_block_hash", || self.rpc.best_block_hash())
            .await?;

        if chain_hash == contract_hash {
            return Ok(None);
        }

        let chain_height = self
            .policy
            .read("btc.header_height", || self.rpc.header_height(&chain_hash))
            .await?;

        let mut arena = HeaderArena::new();
        let mut cursor = chain_hash;

        loop {
            let walked = arena.len() as u64;
            let cursor_height = chain_height.checked_sub(walked).ok_or_else(|| {
                RelayerError::Inconsistent(format!(
                    "walked past genesis from height {chain_height}"
                ))
            })?;

            let contract_at_height = if cursor_height <= contract_height {
                self.policy
                    .read("btc_lc.header_hash_at", || {
                        self.light_client.header_hash_at(cursor_height)
                    })
                    .await?
            } else {
                None
            };

            match walk_stop(
                &cursor,
                cursor_height,
                walked,
                &contract_hash,
                contract_height,
                contract_at_height.as_ref(),
            ) {
                Some(WalkStop::AlreadyHeld) => {
                    debug!(
                        engine = BTC_ENGINE,
                        chain_height,
                        contract_height,
                        "Contract already holds chain best"
                    );
                    return Ok(None);
                }
                Some(stop) => {
                    debug!(
                        engine = BTC_ENGINE,
                        ?stop,
                        walked,
                        tip_height = cursor_height,
                        "Walk-back converged"
                    );
                    return Ok(Some(HeaderDelta {
                        tip_height: cursor_height,
                        headers: arena.into_oldest_first(),
                    }));
                }
                None => {}
            }

            if walked >= self.config.max_walk_back {
                return Err(RelayerError::ForkUnresolved {
                    walked,
                    bound: self.config.max_walk_back,
                });
            }

            let header = self
                .policy
                .read("btc.header", || self.rpc.header(&cursor))
                .await?;
            cursor = header.prev_hash;
            arena.push(header);
        }
    }

    async fn initial_gas(&self) -> Option<u64> {
        if self.config.gas_limit.is_some() {
            return self.config.gas_limit;
        }
        match self.light_client.last_submission_gas().await {
            Ok(previous) => estimate_gas(previous, self.config.gas_margin),
            Err(e) => {
                warn!(engine = BTC_ENGINE, error = %e, "No gas history, submitting unestimated");
                None
            }
        }
    }
}

#[async_trait]
impl<R: BtcChainRpc, L: BtcLightClient> SyncStrategy for BtcHeaderSync<R, L> {
    fn name(&self) -> &'static str {
        BTC_ENGINE
    }

    async fn sync_once(&mut self) -> Result<SyncReport, RelayerError> {
        info!(engine = BTC_ENGINE, "Sync cycle started");

        let delta = match self.compute_delta().await? {
            Some(delta) => delta,
            None => {
                info!(engine = BTC_ENGINE, "Contract already at chain best");
                return Ok(SyncReport::idle(BTC_ENGINE, self.checked_height));
            }
        };

        let target_height = delta.tip_height + delta.headers.len() as u64;
        let batches = plan_batches(delta.headers, delta.tip_height, self.config.batch_size)?;
        let mut report = SyncReport::idle(BTC_ENGINE, self.checked_height);
        let mut gas = self.initial_gas().await;

        for batch in &batches {
            let first = batch.headers.first().map(|h| to_display_hex(&h.hash)).unwrap_or_default();
            let response = self
                .policy
                .submit(
                    self.light_client
                        .submit_headers(batch.tip_height, &batch.headers, gas),
                )
                .await
                .inspect_err(|e| {
                    relayer_telemetry::log_header_event!(
                        error,
                        BTC_ENGINE,
                        "Header batch rejected",
                        batch.tip_height,
                        first,
                        count = batch.headers.len(),
                        error = %e
                    );
                })?;

            relayer_telemetry::log_header_event!(
                info,
                BTC_ENGINE,
                "Header batch submitted",
                batch.tip_height,
                first,
                count = batch.headers.len(),
                gas_used = response.gas_used
            );

            if self.config.gas_limit.is_none() {
                gas = estimate_gas(Some(response.gas_used), self.config.gas_margin);
            }
            report.submitted += batch.headers.len();
            report.batches += 1;
        }

        self.checked_height = target_height;
        report.checked_height = target_height;
        info!(
            engine = BTC_ENGINE,
            submitted = report.submitted,
            batches = report.batches,
            height = target_height,
            "Sync cycle finished"
        );
        Ok(report)
    }
}

/// Build a transaction inclusion proof for `txid` in `block`, checked
/// against the block header's merkle root. Node reads go through `policy`.
pub async fn prove_tx_in_block<R: BtcChainRpc + ?Sized>(
    rpc: &R,
    policy: &ReadPolicy,
    block: &Hash,
    txid: &Hash,
) -> Result<BtcMerkleProof, RelayerError> {
    let header = policy.read("btc.header", || rpc.header(block)).await?;
    let txids = policy.read("btc.block_txids", || rpc.block_txids(block)).await?;
    let tree = btc_merkle::build(&txids)?;

    if tree.root() != header.merkle_root {
        return Err(RelayerError::Inconsistent(format!(
            "transactions of block {} do not hash to its merkle root",
            to_display_hex(block)
        )));
    }

    let proof = btc_merkle::prove_inclusion(&tree, txid)?;
    if btc_merkle::verify(&proof)? != header.merkle_root {
        return Err(RelayerError::InvalidProof(format!(
            "proof for {} does not reach the header root",
            to_display_hex(txid)
        )));
    }
    Ok(proof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayerConfig;
    use crate::test_utils::{MockBtcChain, MockBtcLightClient};

    fn engine(
        chain: &Arc<MockBtcChain>,
        lc: &Arc<MockBtcLightClient>,
    ) -> BtcHeaderSync<MockBtcChain, MockBtcLightClient> {
        let config = RelayerConfig::for_testing();
        BtcHeaderSync::new(
            Arc::clone(chain),
            Arc::clone(lc),
            config.btc,
            ReadPolicy::from_config(&config.contract),
        )
    }

    /// Chain of `len` headers after genesis, with the contract holding the
    /// first `contract_len` of them.
    fn setup(len: usize, contract_len: usize) -> (Arc<MockBtcChain>, Arc<MockBtcLightClient>, Vec<Hash>) {
        let chain = Arc::new(MockBtcChain::new());
        let mut hashes = vec![chain.genesis()];
        hashes.extend(chain.extend(&chain.genesis(), len, 0));
        let lc = Arc::new(MockBtcLightClient::with_chain(0, &hashes[..=contract_len]));
        (chain, lc, hashes)
    }

    #[tokio::test]
    async fn test_in_sync_is_idle() {
        let (chain, lc, _) = setup(5, 5);
        let report = engine(&chain, &lc).sync_once().await.unwrap();
        assert_eq!(report.submitted, 0);
        assert!(lc.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_linear_extension_in_batches() {
        let (chain, lc, hashes) = setup(12, 5);
        let report = engine(&chain, &lc).sync_once().await.unwrap();

        assert_eq!(report.submitted, 7);
        assert_eq!(report.batches, 3);
        assert_eq!(report.checked_height, 12);

        let tips: Vec<u64> = lc.submissions().iter().map(|s| s.tip_height).collect();
        assert_eq!(tips, vec![5, 8, 11]);
        assert_eq!(lc.hash_at(12), Some(hashes[12]));
        // walk stops at the contract best: exactly the 7 missing headers fetched
        assert_eq!(chain.header_fetches(), 7);
    }

    #[tokio::test]
    async fn test_fork_three_below_contract_best() {
        // Contract best at H = 10; the chain reorganises after H - 3 = 7.
        let (chain, lc, hashes) = setup(10, 10);
        let fork = chain.extend(&hashes[7], 6, 99);
        let chain_best_height = 13u64;

        let delta = engine(&chain, &lc).compute_delta().await.unwrap().unwrap();

        assert_eq!(delta.tip_height, 7);
        let collected: Vec<Hash> = delta.headers.iter().map(|h| h.hash).collect();
        assert_eq!(collected, fork);
        assert!(chain.header_fetches() as u64 <= (chain_best_height - 10) + 3);

        engine(&chain, &lc).sync_once().await.unwrap();
        assert_eq!(lc.hash_at(13), Some(fork[5]));
        assert_eq!(lc.hash_at(7), Some(hashes[7]));
    }

    #[tokio::test]
    async fn test_shorter_fork_reaches_below_contract() {
        // Reorg to a branch no longer than the contract's: only a fork walk finds it.
        let (chain, lc, hashes) = setup(10, 10);
        let fork = chain.extend(&hashes[8], 2, 7);

        let delta = engine(&chain, &lc).compute_delta().await.unwrap().unwrap();
        assert_eq!(delta.tip_height, 8);
        assert_eq!(delta.headers.len(), 2);
        assert_eq!(delta.headers[1].hash, fork[1]);
    }

    #[tokio::test]
    async fn test_lagging_node_never_rolls_contract_back() {
        // Node best at 8; the contract holds 0..=8 and two more headers on top.
        let (chain, _, hashes) = setup(8, 8);
        let mut held = hashes.clone();
        held.extend([[9u8; 32], [10u8; 32]]);
        let lc = Arc::new(MockBtcLightClient::with_chain(0, &held));

        assert!(engine(&chain, &lc).compute_delta().await.unwrap().is_none());

        let report = engine(&chain, &lc).sync_once().await.unwrap();
        assert_eq!(report.submitted, 0);
        assert!(lc.submissions().is_empty());
        assert_eq!(lc.hash_at(10), Some([10u8; 32]));
        assert_eq!(chain.header_fetches(), 0);
    }

    #[tokio::test]
    async fn test_walk_back_bound() {
        let (chain, lc, hashes) = setup(3, 3);
        chain.extend(&hashes[1], 80, 5);

        let err = engine(&chain, &lc).sync_once().await.unwrap_err();
        assert!(matches!(err, RelayerError::ForkUnresolved { walked: 50, bound: 50 }));
        assert!(lc.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_aborts_and_keeps_earlier() {
        let (chain, lc, hashes) = setup(12, 5);
        lc.fail_submission(1);

        let err = engine(&chain, &lc).sync_once().await.unwrap_err();
        assert!(matches!(err, RelayerError::Execution { .. }));
        assert_eq!(lc.submissions().len(), 2);
        assert_eq!(lc.hash_at(8), Some(hashes[8]));
        assert_eq!(lc.hash_at(9), None);

        // next cycle resumes from the partially advanced contract
        let report = engine(&chain, &lc).sync_once().await.unwrap();
        assert_eq!(report.submitted, 4);
        assert_eq!(lc.submissions().last().map(|s| s.tip_height), Some(11));
    }

    #[tokio::test]
    async fn test_gas_from_history_then_previous_batch() {
        let (chain, lc, _) = setup(9, 3);
        lc.set_last_gas(Some(100_000));

        engine(&chain, &lc).sync_once().await.unwrap();

        let gas: Vec<Option<u64>> = lc.submissions().iter().map(|s| s.gas).collect();
        assert_eq!(gas[0], Some(120_000));
        // mock reports 150_000 + batch length as used gas
        assert_eq!(gas[1], Some(180_004));
    }

    #[tokio::test]
    async fn test_no_history_leaves_gas_unset() {
        let (chain, lc, _) = setup(4, 3);
        engine(&chain, &lc).sync_once().await.unwrap();
        assert_eq!(lc.submissions()[0].gas, None);
    }

    #[tokio::test]
    async fn test_prove_tx_in_block() {
        let chain = MockBtcChain::new();
        let txids: Vec<Hash> = (1..=5u8).map(|i| [i; 32]).collect();
        let block = chain.add_block_with_txs(&chain.genesis(), txids.clone());

        let policy = ReadPolicy::from_config(&RelayerConfig::for_testing().contract);

        let proof = prove_tx_in_block(&chain, &policy, &block, &txids[3]).await.unwrap();
        assert_eq!(proof.leaf, txids[3]);

        chain.set_txids(&block, txids[..4].to_vec());
        assert!(matches!(
            prove_tx_in_block(&chain, &policy, &block, &txids[0]).await,
            Err(RelayerError::Inconsistent(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prove_tx_in_block_hanging_node_times_out() {
        let chain = MockBtcChain::new();
        let txids: Vec<Hash> = (1..=3u8).map(|i| [i; 32]).collect();
        let block = chain.add_block_with_txs(&chain.genesis(), txids.clone());
        chain.stall();
        let policy = ReadPolicy::from_config(&RelayerConfig::for_testing().contract);

        let result = prove_tx_in_block(&chain, &policy, &block, &txids[0]).await;
        assert!(matches!(result, Err(RelayerError::Timeout(1_000))));
    }
}
