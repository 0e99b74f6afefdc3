//! # Bridge Relayer
//!
//! Off-chain relayer core for a Bitcoin <-> consensus-chain bridge.
//!
//! ## Purpose
//!
//! Keep on-chain light clients in sync with their source chains and produce
//! the inclusion proofs those contracts verify:
//! - Bitcoin merkle proofs (sha256d, odd node paired with itself)
//! - Tendermint merkle proofs (RFC 6962 domain separation)
//! - Bitcoin header sync with fork walk-back
//! - Consensus header sync, one light block at a time or in verified batches
//! - Fixed-block padding of every contract message
//!
//! ## Module Structure
//!
//! ```text
//! bridge-relayer/
//! ├── domain/          # Headers, proofs, sync state, errors
//! ├── algorithms/      # Merkle engines, header selection, padding
//! ├── ports/           # SyncStrategy (inbound) + chain/contract traits (outbound)
//! ├── adapters/        # Contract clients over an encrypted channel
//! ├── application/     # Sync engines and scheduler
//! ├── retry.rs         # Timeouts and query retry
//! └── config.rs        # RelayerConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod retry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-exports
pub use adapters::{
    BtcLightClientContract, ConsensusLightClientContract, ContractClient, RelayHashContract,
};
pub use algorithms::{pad_message, should_include, walk_stop, WalkStop};
pub use application::{
    prove_tx_in_block, prove_tx_result_at, spawn_sync_task, BtcHeaderSync, ConsensusBatchedSync,
    ConsensusSequentialSync, SyncScheduler,
};
pub use config::{ConfigError, RelayerConfig};
pub use domain::{
    BtcHeader, BtcMerkleProof, ConsensusHeader, ErrorKind, Hash, HashChainEntry, LightBlock,
    RelayerError, SyncReport, SyncState, TmMerkleProof, TxResponse, TxResult,
};
pub use ports::{
    BtcChainRpc, BtcLightClient, ConsensusChainRpc, ConsensusLightClient, EncryptedChannel,
    RelayContract, SyncStrategy, TxFilter,
};
pub use retry::{with_timeout, ReadPolicy};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
