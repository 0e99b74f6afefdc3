//! # Consensus Batched Sync
//!
//! Accumulates selected consensus headers across cycles and flushes them in
//! fixed-size batches: the light client verifies each batch against the
//! last attested header and returns a hash chain, which is appended to the
//! relay contract.
//!
//! The relay contract's best height is the source of truth. Queued headers
//! at or below it are dropped at the start of every cycle, so a relay
//! advanced by someone else is picked up without resubmitting.
//!
//! A single relayer per relay contract is assumed. Two relayers flushing
//! the same range race on `append_hash_chain` and the loser's transaction
//! is rejected as stale.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::consensus_sequential::build_light_block;
use crate::algorithms::select_headers;
use crate::config::ConsensusSyncConfig;
use crate::domain::{ConsensusHeader, RelayerError, SyncReport, SyncState};
use crate::ports::{ConsensusChainRpc, ConsensusLightClient, RelayContract, SyncStrategy};
use crate::retry::ReadPolicy;

/// Engine label.
pub const CONSENSUS_BATCHED_ENGINE: &str = "consensus-batched";

/// Batched consensus sync engine.
pub struct ConsensusBatchedSync<R, L, C>
where
    R: ConsensusChainRpc,
    L: ConsensusLightClient,
    C: RelayContract,
{
    rpc: Arc<R>,
    light_client: Arc<L>,
    relay: Arc<C>,
    batch_size: usize,
    policy: ReadPolicy,
    state: SyncState<ConsensusHeader>,
}

impl<R, L, C> ConsensusBatchedSync<R, L, C>
where
    R: ConsensusChainRpc,
    L: ConsensusLightClient,
    C: RelayContract,
{
    /// Create an engine.
    pub fn new(
        rpc: Arc<R>,
        light_client: Arc<L>,
        relay: Arc<C>,
        config: &ConsensusSyncConfig,
        policy: ReadPolicy,
    ) -> Self {
        Self {
            rpc,
            light_client,
            relay,
            batch_size: config.batch_size.max(1),
            policy,
            state: SyncState::new(config.max_interval),
        }
    }

    /// Current sync state.
    pub fn state(&self) -> &SyncState<ConsensusHeader> {
        &self.state
    }

    /// Heights waiting to be flushed, oldest first.
    pub fn pending_heights(&self) -> Vec<u64> {
        self.state.pending_headers.iter().map(|h| h.height).collect()
    }

    /// Read the relay's best entry and resolve it to a node header.
    async fn refresh_relay_best(&mut self) -> Result<ConsensusHeader, RelayerError> {
        let relay_height = self
            .policy
            .read("relay.best_height", || self.relay.best_height())
            .await?;

        if let Some(known) = &self.state.contract_best_header {
            if known.height == relay_height {
                return Ok(known.clone());
            }
        }

        let relay_hash = self
            .policy
            .read("relay.best_hash", || self.relay.best_hash())
            .await?;
        let header = self
            .policy
            .read("consensus.header", || self.rpc.header(relay_height))
            .await?;

        if header.hash != relay_hash {
            return Err(RelayerError::Inconsistent(format!(
                "relay holds {} at height {relay_height}, node has {}",
                hex::encode(relay_hash),
                hex::encode(header.hash)
            )));
        }

        self.state.contract_best_header = Some(header.clone());
        Ok(header)
    }

    fn prune_committed(&mut self, relay_height: u64) {
        let before = self.state.pending_headers.len();
        while self
            .state
            .pending_headers
            .front()
            .is_some_and(|h| h.height <= relay_height)
        {
            self.state.pending_headers.pop_front();
        }

        let dropped = before - self.state.pending_headers.len();
        if dropped > 0 {
            warn!(
                engine = CONSENSUS_BATCHED_ENGINE,
                dropped,
                relay_height,
                "Relay advanced past queued headers"
            );
        }
    }

    /// Flush one batch from the front of the queue.
    async fn flush_batch(&mut self, prev: &ConsensusHeader) -> Result<ConsensusHeader, RelayerError> {
        let batch: Vec<ConsensusHeader> = self
            .state
            .pending_headers
            .iter()
            .take(self.batch_size)
            .cloned()
            .collect();

        let mut blocks = Vec::with_capacity(batch.len());
        for header in &batch {
            blocks.push(build_light_block(self.rpc.as_ref(), &self.policy, header).await?);
        }

        let chain = self
            .policy
            .read("consensus_lc.verify_light_blocks", || {
                self.light_client.verify_light_blocks(prev, &blocks)
            })
            .await?;

        let (first, last) = match (batch.first(), batch.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(RelayerError::Inconsistent("empty batch".to_string())),
        };
        if chain.last().map(|e| (e.height, e.hash)) != Some((last.height, last.hash)) {
            return Err(RelayerError::Inconsistent(format!(
                "verified chain does not end at height {}",
                last.height
            )));
        }

        self.policy
            .submit(self.relay.submit_hash_chain(&chain))
            .await
            .inspect_err(|e| {
                relayer_telemetry::log_header_event!(
                    error,
                    CONSENSUS_BATCHED_ENGINE,
                    "Hash chain rejected",
                    last.height,
                    hex::encode(last.hash),
                    from = first.height,
                    error = %e
                );
            })?;

        relayer_telemetry::log_header_event!(
            info,
            CONSENSUS_BATCHED_ENGINE,
            "Hash chain appended",
            last.height,
            hex::encode(last.hash),
            from = first.height,
            entries = chain.len()
        );

        self.state.pending_headers.drain(..batch.len());
        Ok(last.clone())
    }
}

#[async_trait]
impl<R, L, C> SyncStrategy for ConsensusBatchedSync<R, L, C>
where
    R: ConsensusChainRpc,
    L: ConsensusLightClient,
    C: RelayContract,
{
    fn name(&self) -> &'static str {
        CONSENSUS_BATCHED_ENGINE
    }

    async fn sync_once(&mut self) -> Result<SyncReport, RelayerError> {
        let relay_best = self.refresh_relay_best().await?;
        self.prune_committed(relay_best.height);

        let network_height = self
            .policy
            .read("consensus.latest_height", || self.rpc.latest_height())
            .await?;
        let network_best = self
            .policy
            .read("consensus.header", || self.rpc.header(network_height))
            .await?;
        self.state.network_best_header = Some(network_best);

        let start = self
            .state
            .checked_height()
            .max(relay_best.height)
            .max(self.state.last_seen_height)
            + 1;
        let last_included = self
            .state
            .pending_headers
            .back()
            .cloned()
            .unwrap_or_else(|| relay_best.clone());

        info!(
            engine = CONSENSUS_BATCHED_ENGINE,
            from = start,
            network_height,
            relay_height = relay_best.height,
            queued = self.state.pending_headers.len(),
            "Sync cycle started"
        );

        let mut examined = Vec::with_capacity(network_height.saturating_sub(start) as usize);
        for height in start..network_height {
            let header = self
                .policy
                .read("consensus.header", || self.rpc.header(height))
                .await?;
            examined.push(header);
        }
        for header in select_headers(&examined, &last_included, self.state.max_interval) {
            debug!(engine = CONSENSUS_BATCHED_ENGINE, height = header.height, "Header queued");
            self.state.last_seen_height = header.height;
            self.state.pending_headers.push_back(header);
        }
        self.state.advance_checked(network_height);

        let mut report = SyncReport::idle(CONSENSUS_BATCHED_ENGINE, self.state.checked_height());
        let mut prev = relay_best;
        while self.state.pending_headers.len() >= self.batch_size {
            let before = self.state.pending_headers.len();
            let tip = self.flush_batch(&prev).await?;
            report.submitted += before - self.state.pending_headers.len();
            report.batches += 1;
            self.state.contract_best_header = Some(tip.clone());
            prev = tip;
        }

        info!(
            engine = CONSENSUS_BATCHED_ENGINE,
            submitted = report.submitted,
            queued = self.state.pending_headers.len(),
            "Sync cycle finished"
        );
        Ok(report)
    }
}
