//! # Inbound Ports
//!
//! What the scheduler can drive.

use async_trait::async_trait;

use crate::domain::{RelayerError, SyncReport};

/// One chain pair's sync engine.
///
/// Implementations compare contract truth against chain truth, compute the
/// delta and submit it. A strategy owns its sync state; the scheduler gives
/// each strategy its own task, so `sync_once` is never called concurrently
/// on the same instance.
#[async_trait]
pub trait SyncStrategy: Send {
    /// Engine label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Run one sync cycle.
    ///
    /// An error aborts the current cycle only. Submissions that already
    /// succeeded stay committed; the next cycle re-derives state.
    async fn sync_once(&mut self) -> Result<SyncReport, RelayerError>;
}
