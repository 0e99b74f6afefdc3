//! # Consensus Sequential Sync
//!
//! Submits selected consensus headers to the light client one at a time.
//! A header is selected when its signing validator set differs from the
//! next set committed by the last submitted header, or when `max_interval`
//! heights have passed since it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::algorithms::{should_include, tm_merkle};
use crate::domain::{
    ConsensusHeader, LightBlock, RelayerError, SignedHeader, SyncReport, SyncState, TmMerkleProof,
};
use crate::ports::{ConsensusChainRpc, ConsensusLightClient, SyncStrategy};
use crate::retry::ReadPolicy;

/// Engine label.
pub const CONSENSUS_SEQUENTIAL_ENGINE: &str = "consensus-sequential";

/// Assemble the light block for `header`: its commit (served by the node
/// once the next block exists) and the validator set at its height.
pub(crate) async fn build_light_block<R: ConsensusChainRpc + ?Sized>(
    rpc: &R,
    policy: &ReadPolicy,
    header: &ConsensusHeader,
) -> Result<LightBlock, RelayerError> {
    let height = header.height;
    let commit = policy
        .read("consensus.commit", || rpc.commit(height))
        .await?;
    let validator_set = policy
        .read("consensus.validator_set", || rpc.validator_set(height))
        .await?;

    if commit.block_hash != header.hash {
        return Err(RelayerError::Inconsistent(format!(
            "commit at height {height} signs a different block"
        )));
    }

    Ok(LightBlock {
        signed_header: SignedHeader {
            header: header.clone(),
            commit,
        },
        validator_set,
    })
}

/// Prove the `index`-th transaction result of block `height`.
///
/// The results root is committed by the following header, so the proof is
/// checked against `header(height + 1).last_results_hash`. Returns the
/// encoded leaf together with its proof.
pub async fn prove_tx_result_at<R: ConsensusChainRpc + ?Sized>(
    rpc: &R,
    policy: &ReadPolicy,
    height: u64,
    index: usize,
) -> Result<(Vec<u8>, TmMerkleProof), RelayerError> {
    let results = policy
        .read("consensus.block_results", || rpc.block_results(height))
        .await?;
    let committing = policy
        .read("consensus.header", || rpc.header(height + 1))
        .await?;
    let (root, proof) = tm_merkle::prove_tx_result(&results, index)?;

    if root != committing.last_results_hash {
        return Err(RelayerError::Inconsistent(format!(
            "results of block {height} do not match the root committed at {}",
            height + 1
        )));
    }

    let leaf = tm_merkle::encode_tx_result(&results[index]);
    tm_merkle::verify(&proof, &root, &leaf)?;
    Ok((leaf, proof))
}

/// One-header-per-submission consensus sync engine.
pub struct ConsensusSequentialSync<R: ConsensusChainRpc, L: ConsensusLightClient> {
    rpc: Arc<R>,
    light_client: Arc<L>,
    policy: ReadPolicy,
    state: SyncState<ConsensusHeader>,
}

impl<R: ConsensusChainRpc, L: ConsensusLightClient> ConsensusSequentialSync<R, L> {
    /// Create an engine.
    pub fn new(rpc: Arc<R>, light_client: Arc<L>, max_interval: u64, policy: ReadPolicy) -> Self {
        Self {
            rpc,
            light_client,
            policy,
            state: SyncState::new(max_interval),
        }
    }

    /// Current sync state.
    pub fn state(&self) -> &SyncState<ConsensusHeader> {
        &self.state
    }

    async fn refresh_contract_best(&mut self) -> Result<ConsensusHeader, RelayerError> {
        let trusted_hash = self
            .policy
            .read("consensus_lc.best_committed_hash", || {
                self.light_client.best_committed_hash()
            })
            .await?;
        let trusted_height = self
            .policy
            .read("consensus_lc.current_height", || self.light_client.current_height())
            .await?;

        if let Some(known) = &self.state.contract_best_header {
            if known.hash == trusted_hash && known.height == trusted_height {
                return Ok(known.clone());
            }
        }

        let header = self
            .policy
            .read("consensus.header_by_hash", || {
                self.rpc.header_by_hash(&trusted_hash)
            })
            .await?;
        if header.height != trusted_height {
            return Err(RelayerError::Inconsistent(format!(
                "contract trusts {} at height {trusted_height}, node has it at {}",
                hex::encode(trusted_hash),
                header.height
            )));
        }
        self.state.contract_best_header = Some(header.clone());
        Ok(header)
    }
}

#[async_trait]
impl<R: ConsensusChainRpc, L: ConsensusLightClient> SyncStrategy for ConsensusSequentialSync<R, L> {
    fn name(&self) -> &'static str {
        CONSENSUS_SEQUENTIAL_ENGINE
    }

    async fn sync_once(&mut self) -> Result<SyncReport, RelayerError> {
        let mut last_included = self.refresh_contract_best().await?;

        let network_height = self
            .policy
            .read("consensus.latest_height", || self.rpc.latest_height())
            .await?;
        let network_best = self
            .policy
            .read("consensus.header", || self.rpc.header(network_height))
            .await?;
        self.state.network_best_header = Some(network_best);

        let start = self.state.checked_height().max(last_included.height) + 1;
        info!(
            engine = CONSENSUS_SEQUENTIAL_ENGINE,
            from = start,
            network_height,
            contract_height = last_included.height,
            "Sync cycle started"
        );

        let mut report = SyncReport::idle(CONSENSUS_SEQUENTIAL_ENGINE, self.state.checked_height());

        for height in start..network_height {
            let header = self
                .policy
                .read("consensus.header", || self.rpc.header(height))
                .await?;

            if !should_include(&header, &last_included, self.state.max_interval) {
                continue;
            }

            let block = build_light_block(self.rpc.as_ref(), &self.policy, &header).await?;
            let response = self
                .policy
                .submit(
                    self.light_client
                        .submit_light_blocks(&last_included, std::slice::from_ref(&block)),
                )
                .await?;

            relayer_telemetry::log_header_event!(
                info,
                CONSENSUS_SEQUENTIAL_ENGINE,
                "Light block submitted",
                height,
                hex::encode(header.hash),
                gas_used = response.gas_used
            );

            self.state.contract_best_header = Some(header.clone());
            last_included = header;
            report.submitted += 1;
            report.batches += 1;
        }

        self.state.advance_checked(network_height);
        report.checked_height = self.state.checked_height();
        debug!(
            engine = CONSENSUS_SEQUENTIAL_ENGINE,
            checked_height = report.checked_height,
            "Checked height advanced"
        );
        info!(
            engine = CONSENSUS_SEQUENTIAL_ENGINE,
            submitted = report.submitted,
            "Sync cycle finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayerConfig;
    use crate::domain::TxResult;
    use crate::test_utils::{
        consensus_chain, consensus_header, MockConsensusChain, MockConsensusLightClient,
    };

    fn engine(
        chain: &Arc<MockConsensusChain>,
        lc: &Arc<MockConsensusLightClient>,
        max_interval: u64,
    ) -> ConsensusSequentialSync<MockConsensusChain, MockConsensusLightClient> {
        let policy = ReadPolicy::from_config(&RelayerConfig::for_testing().contract);
        ConsensusSequentialSync::new(Arc::clone(chain), Arc::clone(lc), max_interval, policy)
    }

    #[tokio::test]
    async fn test_liveness_interval_without_rotation() {
        let headers = consensus_chain(112, &[]);
        let chain = Arc::new(MockConsensusChain::new(headers.clone()));
        let lc = Arc::new(MockConsensusLightClient::new(headers[99].clone()));

        let mut engine = engine(&chain, &lc, 5);
        let report = engine.sync_once().await.unwrap();

        assert_eq!(lc.submissions(), vec![vec![105], vec![110]]);
        assert_eq!(report.submitted, 2);
        assert_eq!(report.checked_height, 112);
        assert_eq!(engine.state().checked_height(), 112);
    }

    #[tokio::test]
    async fn test_rotation_is_submitted() {
        let headers = consensus_chain(20, &[10]);
        let chain = Arc::new(MockConsensusChain::new(headers.clone()));
        let lc = Arc::new(MockConsensusLightClient::new(headers[3].clone()));

        // the interval alone would never fire
        engine(&chain, &lc, 100).sync_once().await.unwrap();

        assert_eq!(lc.submissions(), vec![vec![10]]);
    }

    #[tokio::test]
    async fn test_commit_fetched_for_submitted_height_only() {
        let headers = consensus_chain(12, &[]);
        let chain = Arc::new(MockConsensusChain::new(headers.clone()));
        let lc = Arc::new(MockConsensusLightClient::new(headers[0].clone()));

        engine(&chain, &lc, 5).sync_once().await.unwrap();

        assert_eq!(chain.commit_requests(), vec![6, 11]);
    }

    #[tokio::test]
    async fn test_checked_height_only_moves_forward() {
        let headers = consensus_chain(30, &[]);
        let chain = Arc::new(MockConsensusChain::new(headers[..20].to_vec()));
        let lc = Arc::new(MockConsensusLightClient::new(headers[0].clone()));
        let mut engine = engine(&chain, &lc, 100);

        engine.sync_once().await.unwrap();
        assert_eq!(engine.state().checked_height(), 20);
        assert!(lc.submissions().is_empty());

        chain.push(headers[20..].to_vec());
        engine.sync_once().await.unwrap();
        assert_eq!(engine.state().checked_height(), 30);
    }

    #[tokio::test]
    async fn test_unknown_trusted_header_fails_cycle() {
        let headers = consensus_chain(12, &[]);
        let chain = Arc::new(MockConsensusChain::new(headers.clone()));
        // the contract trusts a header the node does not know
        let mut stranger = headers[0].clone();
        stranger.hash = [0xee; 32];
        let lc = Arc::new(MockConsensusLightClient::new(stranger));

        let err = engine(&chain, &lc, 5).sync_once().await.unwrap_err();
        assert!(matches!(err, RelayerError::HeaderNotFound(_)));
    }

    #[tokio::test]
    async fn test_trusted_height_mismatch_is_inconsistent() {
        let headers = consensus_chain(12, &[]);
        let chain = Arc::new(MockConsensusChain::new(headers.clone()));
        // right hash, wrong height
        let mut misplaced = headers[5].clone();
        misplaced.height = 7;
        let lc = Arc::new(MockConsensusLightClient::new(misplaced));

        let err = engine(&chain, &lc, 5).sync_once().await.unwrap_err();
        assert!(matches!(err, RelayerError::Inconsistent(_)));
        assert!(lc.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_prove_tx_result_at() {
        let mut headers = consensus_chain(4, &[]);
        let results: Vec<TxResult> = (0..3)
            .map(|i| TxResult {
                code: i,
                gas_used: 1_000 * i as i64,
                log: format!("log {i}"),
                ..Default::default()
            })
            .collect();
        headers[2].last_results_hash = tm_merkle::results_root(&results);
        let chain = MockConsensusChain::new(headers);
        chain.set_results(2, results.clone());

        let policy = ReadPolicy::from_config(&RelayerConfig::for_testing().contract);
        let (leaf, proof) = prove_tx_result_at(&chain, &policy, 2, 1).await.unwrap();
        assert_eq!(leaf, tm_merkle::encode_tx_result(&results[1]));
        assert_eq!(proof.index, 1);

        let lc = MockConsensusLightClient::new(consensus_header(1, 1, 1));
        lc.set_results_root(2, tm_merkle::results_root(&results));
        assert!(lc.verify_inclusion(2, &leaf, &proof).await.unwrap());
    }

    #[tokio::test]
    async fn test_prove_tx_result_at_detects_mismatch() {
        let headers = consensus_chain(4, &[]);
        let chain = MockConsensusChain::new(headers);
        chain.set_results(2, vec![TxResult::default()]);
        let policy = ReadPolicy::from_config(&RelayerConfig::for_testing().contract);

        assert!(matches!(
            prove_tx_result_at(&chain, &policy, 2, 0).await,
            Err(RelayerError::Inconsistent(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prove_tx_result_at_hanging_node_times_out() {
        let chain = MockConsensusChain::new(consensus_chain(4, &[]));
        chain.set_results(2, vec![TxResult::default()]);
        chain.stall();
        let policy = ReadPolicy::from_config(&RelayerConfig::for_testing().contract);

        assert!(matches!(
            prove_tx_result_at(&chain, &policy, 2, 0).await,
            Err(RelayerError::Timeout(1_000))
        ));
    }
}
