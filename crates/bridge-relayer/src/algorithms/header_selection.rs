//! # Header Selection
//!
//! Pure decision rules shared by the sync engines:
//! - which consensus headers must be submitted (validator rotation, liveness),
//! - when a Bitcoin walk-back has met contract history,
//! - how collected headers are cut into contract-sized batches.

use crate::domain::{invariant_batch_size, ConsensusHeader, Hash, RelayerError};

/// Whether `candidate` must be submitted after `last_included`.
///
/// True when the signing validator set differs from what `last_included`
/// committed to as its next set, or when the height gap reached
/// `max_interval`.
pub fn should_include(
    candidate: &ConsensusHeader,
    last_included: &ConsensusHeader,
    max_interval: u64,
) -> bool {
    let rotated = candidate.validators_hash != last_included.next_validators_hash;
    let gap = candidate.height.saturating_sub(last_included.height);
    rotated || gap >= max_interval
}

/// Apply [`should_include`] over an ascending run of headers.
pub fn select_headers(
    headers: &[ConsensusHeader],
    last_included: &ConsensusHeader,
    max_interval: u64,
) -> Vec<ConsensusHeader> {
    let mut selected = Vec::new();
    let mut last = last_included;

    for header in headers {
        if should_include(header, last, max_interval) {
            selected.push(header.clone());
            last = header;
        }
    }

    selected
}

/// Why a Bitcoin walk-back stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkStop {
    /// The contract already holds chain best: nothing to submit.
    AlreadyHeld,
    /// Reached the contract's best header: plain extension.
    LinearExtension,
    /// Reached a header the contract already holds below its tip: a reorg.
    ForkConvergence,
}

/// Decide whether the walk stops at `candidate`.
///
/// `walked` is how many headers were already collected. Contract history
/// only counts at or below `contract_height`; `contract_hash_at_height` is
/// the contract's own header at `candidate_height`, if known. The node may
/// lag behind the contract, in which case chain best itself can already be
/// held.
pub fn walk_stop(
    candidate: &Hash,
    candidate_height: u64,
    walked: u64,
    contract_best: &Hash,
    contract_height: u64,
    contract_hash_at_height: Option<&Hash>,
) -> Option<WalkStop> {
    if candidate == contract_best {
        return Some(WalkStop::LinearExtension);
    }
    if candidate_height <= contract_height && contract_hash_at_height == Some(candidate) {
        return Some(if walked == 0 {
            WalkStop::AlreadyHeld
        } else {
            WalkStop::ForkConvergence
        });
    }
    None
}

/// Append-only list of headers fetched during one walk-back.
///
/// Headers are pushed newest first and handed out oldest first.
#[derive(Clone, Debug)]
pub struct HeaderArena<H> {
    headers: Vec<H>,
}

impl<H> Default for HeaderArena<H> {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
        }
    }
}

impl<H> HeaderArena<H> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header; returns its position.
    pub fn push(&mut self, header: H) -> usize {
        self.headers.push(header);
        self.headers.len() - 1
    }

    /// Number of headers collected.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Consume into oldest-first order.
    pub fn into_oldest_first(mut self) -> Vec<H> {
        self.headers.reverse();
        self.headers
    }
}

/// One contract call's worth of headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderBatch<H> {
    /// Height of the header the batch builds on.
    pub tip_height: u64,
    /// Headers, oldest first.
    pub headers: Vec<H>,
}

/// Cut oldest-first headers into batches with running tip heights.
pub fn plan_batches<H>(
    headers: Vec<H>,
    start_tip_height: u64,
    batch_size: usize,
) -> Result<Vec<HeaderBatch<H>>, RelayerError> {
    invariant_batch_size(batch_size)?;

    let mut batches = Vec::with_capacity(headers.len().div_ceil(batch_size));
    let mut tip_height = start_tip_height;
    let mut iter = headers.into_iter().peekable();

    while iter.peek().is_some() {
        let chunk: Vec<H> = iter.by_ref().take(batch_size).collect();
        let len = chunk.len() as u64;
        batches.push(HeaderBatch {
            tip_height,
            headers: chunk,
        });
        tip_height += len;
    }

    Ok(batches)
}

/// Gas for the next submission, scaled from the previous one's usage.
pub fn estimate_gas(previous_gas_used: Option<u64>, margin: f64) -> Option<u64> {
    previous_gas_used.map(|used| (used as f64 * margin).ceil() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vhash(n: u8) -> Hash {
        [n; 32]
    }

    fn header(height: u64, vals: u8, next_vals: u8) -> ConsensusHeader {
        ConsensusHeader {
            height,
            hash: [height as u8; 32],
            validators_hash: vhash(vals),
            next_validators_hash: vhash(next_vals),
            last_results_hash: [0u8; 32],
        }
    }

    #[test]
    fn test_interval_selects_without_rotation() {
        let last = header(100, 1, 1);
        let run: Vec<_> = (101..=110).map(|h| header(h, 1, 1)).collect();
        let selected = select_headers(&run, &last, 5);
        let heights: Vec<u64> = selected.iter().map(|h| h.height).collect();
        assert_eq!(heights, vec![105, 110]);
    }

    #[test]
    fn test_rotation_selects_changed_height() {
        let last = header(4, 1, 1);
        // Validator set changes at height 8; the last included header
        // still commits to the old set.
        let run: Vec<_> = (5..=12)
            .map(|h| match h {
                ..=6 => header(h, 1, 1),
                7 => header(h, 1, 2),
                _ => header(h, 2, 2),
            })
            .collect();
        let heights: Vec<u64> = select_headers(&run, &last, 5)
            .iter()
            .map(|h| h.height)
            .collect();
        assert_eq!(heights, vec![8]);
    }

    #[test]
    fn test_nothing_selected_inside_interval() {
        let last = header(100, 1, 1);
        let run: Vec<_> = (101..=104).map(|h| header(h, 1, 1)).collect();
        assert!(select_headers(&run, &last, 5).is_empty());
    }

    #[test]
    fn test_walk_stop_linear() {
        let best = vhash(7);
        assert_eq!(
            walk_stop(&best, 10, 3, &best, 10, None),
            Some(WalkStop::LinearExtension)
        );
    }

    #[test]
    fn test_walk_stop_convergence_only_within_contract_history() {
        let best = vhash(7);
        let candidate = vhash(3);
        assert_eq!(walk_stop(&candidate, 11, 2, &best, 10, Some(&candidate)), None);
        assert_eq!(
            walk_stop(&candidate, 9, 3, &best, 10, Some(&candidate)),
            Some(WalkStop::ForkConvergence)
        );
        assert_eq!(walk_stop(&candidate, 9, 3, &best, 10, Some(&vhash(4))), None);
    }

    #[test]
    fn test_walk_stop_chain_best_behind_contract() {
        let best = vhash(7);
        let node_best = vhash(5);
        assert_eq!(
            walk_stop(&node_best, 8, 0, &best, 10, Some(&node_best)),
            Some(WalkStop::AlreadyHeld)
        );
    }

    #[test]
    fn test_arena_reverses() {
        let mut arena = HeaderArena::new();
        assert_eq!(arena.push(3), 0);
        arena.push(2);
        arena.push(1);
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.into_oldest_first(), vec![1, 2, 3]);
    }

    #[test]
    fn test_plan_batches_tip_heights() {
        let batches = plan_batches((1..=7).collect::<Vec<u32>>(), 100, 3).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].tip_height, 100);
        assert_eq!(batches[1].tip_height, 103);
        assert_eq!(batches[2].tip_height, 106);
        assert_eq!(batches[2].headers, vec![7]);
    }

    #[test]
    fn test_plan_batches_zero_size() {
        assert!(plan_batches(vec![1u8], 0, 0).is_err());
    }

    #[test]
    fn test_estimate_gas() {
        assert_eq!(estimate_gas(Some(100_000), 1.2), Some(120_000));
        assert_eq!(estimate_gas(None, 1.2), None);
    }
}
