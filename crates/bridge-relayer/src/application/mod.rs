//! # Application Module
//!
//! Sync engines and the scheduler that drives them.
//!
//! | Engine | Source | Target |
//! |--------|--------|--------|
//! | [`BtcHeaderSync`] | Bitcoin node | Bitcoin light client |
//! | [`ConsensusSequentialSync`] | Consensus node | Consensus light client |
//! | [`ConsensusBatchedSync`] | Consensus node | Light client (verify) + relay |

pub mod btc_header_sync;
pub mod consensus_batched;
pub mod consensus_sequential;
pub mod scheduler;

pub use btc_header_sync::{prove_tx_in_block, BtcHeaderSync, HeaderDelta, BTC_ENGINE};
pub use consensus_batched::{ConsensusBatchedSync, CONSENSUS_BATCHED_ENGINE};
pub use consensus_sequential::{
    prove_tx_result_at, ConsensusSequentialSync, CONSENSUS_SEQUENTIAL_ENGINE,
};
pub use scheduler::{spawn_sync_task, SyncScheduler};
