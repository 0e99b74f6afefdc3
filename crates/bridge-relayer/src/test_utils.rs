//! In-memory implementations of every outbound port, for engine and
//! adapter tests.
//!
//! All mocks use interior mutability so tests can keep an `Arc` to inspect
//! what the engine did.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::algorithms::{btc_merkle, leaf_hash, sha256, tm_merkle};
use crate::domain::{
    BtcHeader, Commit, CommitSig, ConsensusHeader, Hash, HashChainEntry, LightBlock, RelayerError,
    TmMerkleProof, TxResponse, TxResult, Validator, ValidatorSet, BTC_HEADER_LEN,
};
use crate::ports::{
    BtcChainRpc, BtcLightClient, ConsensusChainRpc, ConsensusLightClient, EncryptedChannel,
    RelayContract, TxFilter,
};

/// Build a Bitcoin header on top of `prev`. `salt` lands in the nonce so
/// sibling branches get distinct hashes.
pub fn btc_header(prev: &Hash, merkle_root: &Hash, salt: u32) -> BtcHeader {
    let mut raw = vec![0u8; BTC_HEADER_LEN];
    raw[..4].copy_from_slice(&1u32.to_le_bytes());
    raw[4..36].copy_from_slice(prev);
    raw[36..68].copy_from_slice(merkle_root);
    raw[76..80].copy_from_slice(&salt.to_le_bytes());
    // from_raw cannot fail on an 80-byte buffer
    BtcHeader::from_raw(&raw).expect("80-byte header")
}

#[derive(Default)]
struct BtcChainState {
    headers: HashMap<Hash, (BtcHeader, u64)>,
    txids: HashMap<Hash, Vec<Hash>>,
    best: Hash,
    header_fetches: usize,
    stalled: bool,
}

/// Bitcoin node holding a header tree.
pub struct MockBtcChain {
    state: Mutex<BtcChainState>,
    genesis: Hash,
}

impl MockBtcChain {
    /// A chain holding only a genesis header at height 0.
    pub fn new() -> Self {
        let genesis = btc_header(&[0u8; 32], &[0u8; 32], 0);
        let hash = genesis.hash;
        let mut state = BtcChainState {
            best: hash,
            ..Default::default()
        };
        state.headers.insert(hash, (genesis, 0));
        Self {
            state: Mutex::new(state),
            genesis: hash,
        }
    }

    /// Genesis hash.
    pub fn genesis(&self) -> Hash {
        self.genesis
    }

    /// Append `count` headers on top of `parent` and make the last one best.
    /// Returns the new hashes, oldest first.
    pub fn extend(&self, parent: &Hash, count: usize, salt: u32) -> Vec<Hash> {
        let mut state = self.state.lock().unwrap();
        let mut height = state.headers[parent].1;
        let mut prev = *parent;
        let mut hashes = Vec::with_capacity(count);

        for _ in 0..count {
            height += 1;
            let header = btc_header(&prev, &[height as u8; 32], salt);
            prev = header.hash;
            hashes.push(header.hash);
            state.headers.insert(header.hash, (header, height));
        }

        state.best = prev;
        hashes
    }

    /// Append one block with the given transactions and make it best.
    pub fn add_block_with_txs(&self, parent: &Hash, txids: Vec<Hash>) -> Hash {
        let root = btc_merkle::compute_root(&txids).expect("non-empty txids");
        let mut state = self.state.lock().unwrap();
        let height = state.headers[parent].1 + 1;
        let header = btc_header(parent, &root, 0);
        let hash = header.hash;
        state.headers.insert(hash, (header, height));
        state.txids.insert(hash, txids);
        state.best = hash;
        hash
    }

    /// Replace a block's transaction list without touching its header.
    pub fn set_txids(&self, block: &Hash, txids: Vec<Hash>) {
        self.state.lock().unwrap().txids.insert(*block, txids);
    }

    /// Number of `header` calls served.
    pub fn header_fetches(&self) -> usize {
        self.state.lock().unwrap().header_fetches
    }

    /// Make every later `header` and `block_txids` call hang forever.
    pub fn stall(&self) {
        self.state.lock().unwrap().stalled = true;
    }

    async fn wait_if_stalled(&self) {
        let stalled = self.state.lock().unwrap().stalled;
        if stalled {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for MockBtcChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BtcChainRpc for MockBtcChain {
    async fn best_block_hash(&self) -> Result<Hash, RelayerError> {
        Ok(self.state.lock().unwrap().best)
    }

    async fn header(&self, hash: &Hash) -> Result<BtcHeader, RelayerError> {
        self.wait_if_stalled().await;
        let mut state = self.state.lock().unwrap();
        state.header_fetches += 1;
        state
            .headers
            .get(hash)
            .map(|(h, _)| h.clone())
            .ok_or_else(|| RelayerError::HeaderNotFound(hex::encode(hash)))
    }

    async fn header_height(&self, hash: &Hash) -> Result<u64, RelayerError> {
        self.state
            .lock()
            .unwrap()
            .headers
            .get(hash)
            .map(|(_, height)| *height)
            .ok_or_else(|| RelayerError::HeaderNotFound(hex::encode(hash)))
    }

    async fn block_txids(&self, hash: &Hash) -> Result<Vec<Hash>, RelayerError> {
        self.wait_if_stalled().await;
        self.state
            .lock()
            .unwrap()
            .txids
            .get(hash)
            .cloned()
            .ok_or_else(|| RelayerError::HeaderNotFound(hex::encode(hash)))
    }
}

/// A recorded `submit_headers` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BtcSubmission {
    /// Tip height the batch was submitted at
    pub tip_height: u64,
    /// Submitted header hashes, oldest first
    pub hashes: Vec<Hash>,
    /// Gas passed with the call
    pub gas: Option<u64>,
}

#[derive(Default)]
struct BtcLightClientState {
    chain: BTreeMap<u64, Hash>,
    submissions: Vec<BtcSubmission>,
    last_gas: Option<u64>,
    gas_used: u64,
    fail_submission: Option<usize>,
}

/// Bitcoin light client contract that links submitted headers.
pub struct MockBtcLightClient {
    state: Mutex<BtcLightClientState>,
}

impl MockBtcLightClient {
    /// A contract whose best chain is `hashes`, the first at `start_height`.
    pub fn with_chain(start_height: u64, hashes: &[Hash]) -> Self {
        let chain = hashes
            .iter()
            .enumerate()
            .map(|(i, h)| (start_height + i as u64, *h))
            .collect();
        Self {
            state: Mutex::new(BtcLightClientState {
                chain,
                gas_used: 150_000,
                ..Default::default()
            }),
        }
    }

    /// Report `gas` as the last successful submission's usage.
    pub fn set_last_gas(&self, gas: Option<u64>) {
        self.state.lock().unwrap().last_gas = gas;
    }

    /// Reject the `n`-th submission (0-based) with an execution error.
    pub fn fail_submission(&self, n: usize) {
        self.state.lock().unwrap().fail_submission = Some(n);
    }

    /// Every accepted or rejected submission.
    pub fn submissions(&self) -> Vec<BtcSubmission> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// Hash held at `height`.
    pub fn hash_at(&self, height: u64) -> Option<Hash> {
        self.state.lock().unwrap().chain.get(&height).copied()
    }

    fn tip(state: &BtcLightClientState) -> (u64, Hash) {
        state
            .chain
            .iter()
            .next_back()
            .map(|(h, hash)| (*h, *hash))
            .unwrap_or((0, [0u8; 32]))
    }
}

#[async_trait]
impl BtcLightClient for MockBtcLightClient {
    async fn best_header_hash(&self) -> Result<Hash, RelayerError> {
        Ok(Self::tip(&self.state.lock().unwrap()).1)
    }

    async fn best_height(&self) -> Result<u64, RelayerError> {
        Ok(Self::tip(&self.state.lock().unwrap()).0)
    }

    async fn header_hash_at(&self, height: u64) -> Result<Option<Hash>, RelayerError> {
        Ok(self.hash_at(height))
    }

    async fn submit_headers(
        &self,
        tip_height: u64,
        headers: &[BtcHeader],
        gas: Option<u64>,
    ) -> Result<TxResponse, RelayerError> {
        let mut state = self.state.lock().unwrap();
        let index = state.submissions.len();
        state.submissions.push(BtcSubmission {
            tip_height,
            hashes: headers.iter().map(|h| h.hash).collect(),
            gas,
        });

        if state.fail_submission == Some(index) {
            return Err(RelayerError::Execution {
                request: format!("submit_headers@{tip_height}"),
                code: 5,
                log: "rejected".to_string(),
            });
        }

        let mut parent = state.chain.get(&tip_height).copied();
        for header in headers {
            if parent != Some(header.prev_hash) {
                return Err(RelayerError::Execution {
                    request: format!("submit_headers@{tip_height}"),
                    code: 3,
                    log: "header does not link".to_string(),
                });
            }
            parent = Some(header.hash);
        }

        state.chain.retain(|height, _| *height <= tip_height);
        for (i, header) in headers.iter().enumerate() {
            state.chain.insert(tip_height + 1 + i as u64, header.hash);
        }

        let gas_used = state.gas_used + headers.len() as u64;
        state.last_gas = Some(gas_used);
        Ok(TxResponse {
            tx_hash: format!("btc-{index}"),
            code: 0,
            gas_wanted: gas.unwrap_or(0),
            gas_used,
            ..Default::default()
        })
    }

    async fn last_submission_gas(&self) -> Result<Option<u64>, RelayerError> {
        Ok(self.state.lock().unwrap().last_gas)
    }
}

/// Deterministic consensus header. `vals` and `next_vals` identify
/// validator sets.
pub fn consensus_header(height: u64, vals: u8, next_vals: u8) -> ConsensusHeader {
    ConsensusHeader {
        height,
        hash: sha256(&height.to_be_bytes()),
        validators_hash: [vals; 32],
        next_validators_hash: [next_vals; 32],
        last_results_hash: [0u8; 32],
    }
}

/// Headers for heights `1..=len`, where the validator set changes at each
/// height in `rotations`.
pub fn consensus_chain(len: u64, rotations: &[u64]) -> Vec<ConsensusHeader> {
    let set_at = |h: u64| rotations.iter().filter(|r| **r <= h).count() as u8 + 1;
    (1..=len)
        .map(|h| consensus_header(h, set_at(h), set_at(h + 1)))
        .collect()
}

#[derive(Default)]
struct ConsensusChainState {
    headers: BTreeMap<u64, ConsensusHeader>,
    results: HashMap<u64, Vec<TxResult>>,
    latest: u64,
    commit_requests: Vec<u64>,
    stalled: bool,
}

/// Consensus node.
pub struct MockConsensusChain {
    state: Mutex<ConsensusChainState>,
}

impl MockConsensusChain {
    /// A node serving `headers`; latest height is the highest one.
    pub fn new(headers: Vec<ConsensusHeader>) -> Self {
        let latest = headers.iter().map(|h| h.height).max().unwrap_or(0);
        Self {
            state: Mutex::new(ConsensusChainState {
                headers: headers.into_iter().map(|h| (h.height, h)).collect(),
                latest,
                ..Default::default()
            }),
        }
    }

    /// Add headers and move latest to the highest.
    pub fn push(&self, headers: Vec<ConsensusHeader>) {
        let mut state = self.state.lock().unwrap();
        for header in headers {
            state.latest = state.latest.max(header.height);
            state.headers.insert(header.height, header);
        }
    }

    /// Store transaction results for a block.
    pub fn set_results(&self, height: u64, results: Vec<TxResult>) {
        self.state.lock().unwrap().results.insert(height, results);
    }

    /// Heights whose commit was requested.
    pub fn commit_requests(&self) -> Vec<u64> {
        self.state.lock().unwrap().commit_requests.clone()
    }

    /// Make every later `header` and `block_results` call hang forever.
    pub fn stall(&self) {
        self.state.lock().unwrap().stalled = true;
    }

    async fn wait_if_stalled(&self) {
        let stalled = self.state.lock().unwrap().stalled;
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    fn get(&self, height: u64) -> Result<ConsensusHeader, RelayerError> {
        self.state
            .lock()
            .unwrap()
            .headers
            .get(&height)
            .cloned()
            .ok_or_else(|| RelayerError::HeaderNotFound(format!("height {height}")))
    }
}

#[async_trait]
impl ConsensusChainRpc for MockConsensusChain {
    async fn latest_height(&self) -> Result<u64, RelayerError> {
        Ok(self.state.lock().unwrap().latest)
    }

    async fn header(&self, height: u64) -> Result<ConsensusHeader, RelayerError> {
        self.wait_if_stalled().await;
        self.get(height)
    }

    async fn header_by_hash(&self, hash: &Hash) -> Result<ConsensusHeader, RelayerError> {
        self.state
            .lock()
            .unwrap()
            .headers
            .values()
            .find(|h| h.hash == *hash)
            .cloned()
            .ok_or_else(|| RelayerError::HeaderNotFound(hex::encode(hash)))
    }

    async fn commit(&self, height: u64) -> Result<Commit, RelayerError> {
        self.state.lock().unwrap().commit_requests.push(height);
        let header = self.get(height)?;
        // The commit for a block lives in its successor.
        self.get(height + 1)?;
        Ok(Commit {
            height,
            round: 0,
            block_hash: header.hash,
            signatures: vec![CommitSig {
                validator_address: header.validators_hash[..20].to_vec(),
                signature: header.hash.to_vec(),
                timestamp_nanos: height as i64,
            }],
        })
    }

    async fn validator_set(&self, height: u64) -> Result<ValidatorSet, RelayerError> {
        let header = self.get(height)?;
        Ok(ValidatorSet {
            validators: vec![Validator {
                address: header.validators_hash[..20].to_vec(),
                pub_key: header.validators_hash.to_vec(),
                voting_power: 10,
            }],
        })
    }

    async fn block_results(&self, height: u64) -> Result<Vec<TxResult>, RelayerError> {
        self.wait_if_stalled().await;
        Ok(self
            .state
            .lock()
            .unwrap()
            .results
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }
}

struct ConsensusLightClientState {
    trusted: ConsensusHeader,
    submissions: Vec<Vec<u64>>,
    verifications: Vec<Vec<u64>>,
    results_roots: HashMap<u64, Hash>,
    reject_verification: bool,
}

/// Consensus light client that trusts whatever links to its trusted header.
pub struct MockConsensusLightClient {
    state: Mutex<ConsensusLightClientState>,
}

impl MockConsensusLightClient {
    /// A contract trusting `trusted`.
    pub fn new(trusted: ConsensusHeader) -> Self {
        Self {
            state: Mutex::new(ConsensusLightClientState {
                trusted,
                submissions: Vec::new(),
                verifications: Vec::new(),
                results_roots: HashMap::new(),
                reject_verification: false,
            }),
        }
    }

    /// Heights of each `submit_light_blocks` call.
    pub fn submissions(&self) -> Vec<Vec<u64>> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// Heights of each `verify_light_blocks` call.
    pub fn verifications(&self) -> Vec<Vec<u64>> {
        self.state.lock().unwrap().verifications.clone()
    }

    /// Results root committed for `height`.
    pub fn set_results_root(&self, height: u64, root: Hash) {
        self.state.lock().unwrap().results_roots.insert(height, root);
    }

    /// Make `verify_light_blocks` fail.
    pub fn reject_verification(&self) {
        self.state.lock().unwrap().reject_verification = true;
    }
}

#[async_trait]
impl ConsensusLightClient for MockConsensusLightClient {
    async fn best_committed_hash(&self) -> Result<Hash, RelayerError> {
        Ok(self.state.lock().unwrap().trusted.hash)
    }

    async fn current_height(&self) -> Result<u64, RelayerError> {
        Ok(self.state.lock().unwrap().trusted.height)
    }

    async fn submit_light_blocks(
        &self,
        prev: &ConsensusHeader,
        blocks: &[LightBlock],
    ) -> Result<TxResponse, RelayerError> {
        let mut state = self.state.lock().unwrap();
        if prev.hash != state.trusted.hash {
            return Err(RelayerError::Execution {
                request: format!("submit_light_blocks@{}", prev.height),
                code: 7,
                log: "previous header is not trusted".to_string(),
            });
        }
        state
            .submissions
            .push(blocks.iter().map(LightBlock::height).collect());
        if let Some(last) = blocks.last() {
            state.trusted = last.signed_header.header.clone();
        }
        Ok(TxResponse {
            code: 0,
            gas_used: 90_000,
            ..Default::default()
        })
    }

    async fn verify_light_blocks(
        &self,
        prev: &ConsensusHeader,
        blocks: &[LightBlock],
    ) -> Result<Vec<HashChainEntry>, RelayerError> {
        let mut state = self.state.lock().unwrap();
        state
            .verifications
            .push(blocks.iter().map(LightBlock::height).collect());
        if state.reject_verification {
            return Err(RelayerError::InvalidProof("validator set mismatch".to_string()));
        }

        let mut last = prev.height;
        for block in blocks {
            if block.height() <= last || block.signed_header.commit.block_hash != block.hash() {
                return Err(RelayerError::InvalidProof(format!(
                    "light block {} does not follow {}",
                    block.height(),
                    last
                )));
            }
            last = block.height();
        }

        Ok(blocks
            .iter()
            .map(|b| HashChainEntry {
                height: b.height(),
                hash: b.hash(),
            })
            .collect())
    }

    async fn verify_inclusion(
        &self,
        height: u64,
        leaf: &[u8],
        proof: &TmMerkleProof,
    ) -> Result<bool, RelayerError> {
        let root = match self.state.lock().unwrap().results_roots.get(&height) {
            Some(root) => *root,
            None => return Ok(false),
        };
        Ok(leaf_hash(leaf) == proof.leaf_hash && tm_merkle::compute_root(proof)? == root)
    }
}

#[derive(Default)]
struct RelayState {
    chain: Vec<HashChainEntry>,
    submissions: Vec<Vec<u64>>,
}

/// Relay contract storing hash chains.
pub struct MockRelayContract {
    state: Mutex<RelayState>,
}

impl MockRelayContract {
    /// A relay whose newest entry is `(height, hash)`.
    pub fn new(height: u64, hash: Hash) -> Self {
        Self {
            state: Mutex::new(RelayState {
                chain: vec![HashChainEntry { height, hash }],
                submissions: Vec::new(),
            }),
        }
    }

    /// Simulate another relayer advancing the contract.
    pub fn advance_externally(&self, height: u64, hash: Hash) {
        self.state
            .lock()
            .unwrap()
            .chain
            .push(HashChainEntry { height, hash });
    }

    /// Heights of each accepted chain submission.
    pub fn submissions(&self) -> Vec<Vec<u64>> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn best(&self) -> HashChainEntry {
        let state = self.state.lock().unwrap();
        state.chain[state.chain.len() - 1].clone()
    }
}

#[async_trait]
impl RelayContract for MockRelayContract {
    async fn best_height(&self) -> Result<u64, RelayerError> {
        Ok(self.best().height)
    }

    async fn best_hash(&self) -> Result<Hash, RelayerError> {
        Ok(self.best().hash)
    }

    async fn submit_hash_chain(&self, chain: &[HashChainEntry]) -> Result<TxResponse, RelayerError> {
        let mut state = self.state.lock().unwrap();
        let best = state.chain[state.chain.len() - 1].height;
        if chain.first().map_or(true, |e| e.height <= best) {
            return Err(RelayerError::Execution {
                request: "append_hash_chain".to_string(),
                code: 9,
                log: "stale hash chain".to_string(),
            });
        }
        state.submissions.push(chain.iter().map(|e| e.height).collect());
        state.chain.extend_from_slice(chain);
        Ok(TxResponse::default())
    }
}

type QueryHandler = Box<dyn Fn(&Value) -> Result<Value, RelayerError> + Send + Sync>;

#[derive(Default)]
struct ChannelState {
    handlers: HashMap<String, QueryHandler>,
    queries: Vec<Value>,
    query_failures: VecDeque<RelayerError>,
    executions: Vec<(Value, Option<u64>)>,
    execute_results: VecDeque<Result<TxResponse, RelayerError>>,
    recent: Vec<TxResponse>,
    last_filter: Option<TxFilter>,
}

/// Encrypted channel that records traffic and answers from handlers.
pub struct MockChannel {
    sender: String,
    state: Mutex<ChannelState>,
}

impl MockChannel {
    /// An empty channel.
    pub fn new() -> Self {
        Self {
            sender: "secret1relayer".to_string(),
            state: Mutex::new(ChannelState::default()),
        }
    }

    /// Answer queries whose top-level key is `action`.
    pub fn on_query<F>(&self, action: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, RelayerError> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .unwrap()
            .handlers
            .insert(action.to_string(), Box::new(handler));
    }

    /// Fail the next `n` queries with `err`.
    pub fn fail_next_queries(&self, n: usize, err: RelayerError) {
        let mut state = self.state.lock().unwrap();
        state.query_failures.extend(std::iter::repeat(err).take(n));
    }

    /// Queue a response for the next execution.
    pub fn push_execute_response(&self, response: TxResponse) {
        self.state
            .lock()
            .unwrap()
            .execute_results
            .push_back(Ok(response));
    }

    /// Fail the next `n` executions with `err`.
    pub fn fail_next_executes(&self, n: usize, err: RelayerError) {
        let mut state = self.state.lock().unwrap();
        state
            .execute_results
            .extend(std::iter::repeat(Err(err)).take(n));
    }

    /// History returned by `recent_txs`.
    pub fn set_recent_txs(&self, txs: Vec<TxResponse>) {
        self.state.lock().unwrap().recent = txs;
    }

    /// Queries sent so far, padded.
    pub fn queries(&self) -> Vec<Value> {
        self.state.lock().unwrap().queries.clone()
    }

    /// Executions sent so far, padded, with their gas.
    pub fn executions(&self) -> Vec<(Value, Option<u64>)> {
        self.state.lock().unwrap().executions.clone()
    }

    /// Filter of the last `recent_txs` call.
    pub fn last_filter(&self) -> Option<TxFilter> {
        self.state.lock().unwrap().last_filter.clone()
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn first_key(msg: &Value) -> String {
    msg.as_object()
        .and_then(|m| m.keys().next().cloned())
        .unwrap_or_default()
}

#[async_trait]
impl EncryptedChannel for MockChannel {
    fn sender(&self) -> &str {
        &self.sender
    }

    async fn execute(
        &self,
        _contract: &str,
        msg: Value,
        gas: Option<u64>,
    ) -> Result<TxResponse, RelayerError> {
        let mut state = self.state.lock().unwrap();
        state.executions.push((msg, gas));
        let index = state.executions.len();
        state.execute_results.pop_front().unwrap_or_else(|| {
            Ok(TxResponse {
                tx_hash: format!("tx-{index}"),
                code: 0,
                gas_wanted: gas.unwrap_or(200_000),
                gas_used: 100_000,
                ..Default::default()
            })
        })
    }

    async fn query(&self, _contract: &str, msg: Value) -> Result<Value, RelayerError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(msg.clone());
        if let Some(err) = state.query_failures.pop_front() {
            return Err(err);
        }
        let action = first_key(&msg);
        match state.handlers.get(&action) {
            Some(handler) => handler(&msg),
            None => Err(RelayerError::InvalidMessage(format!("no handler for {action}"))),
        }
    }

    async fn recent_txs(&self, filter: &TxFilter) -> Result<Vec<TxResponse>, RelayerError> {
        let mut state = self.state.lock().unwrap();
        state.last_filter = Some(filter.clone());
        Ok(state.recent.clone())
    }
}
