//! # Domain Errors
//!
//! Error types for the relayer core.
//!
//! Errors fall into five kinds (see [`ErrorKind`]). Only transient errors are
//! ever retried, and only on read-only paths.

use thiserror::Error;

/// Hash type alias (32 bytes, internal byte order)
pub type Hash = [u8; 32];

/// Coarse classification of a [`RelayerError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed local input. Never retried.
    Validation,
    /// Requested leaf or header is absent.
    NotFound,
    /// Timeouts, connection failures, rate limiting. Retried on reads.
    Transient,
    /// On-chain call rejected with a non-zero code.
    Execution,
    /// Contract and chain could not be reconciled this cycle.
    Consistency,
}

/// Relayer error types.
#[derive(Clone, Debug, Error)]
pub enum RelayerError {
    /// A merkle tree was requested over zero leaves.
    #[error("Cannot build a merkle tree from an empty leaf set")]
    EmptyLeafSet,

    /// Proof index outside `0..total`.
    #[error("Leaf index {index} out of range for {total} leaves")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Leaf count
        total: usize,
    },

    /// Bitcoin-style proof whose sibling and prefix lists disagree.
    #[error("Proof shape mismatch: {siblings} siblings vs {prefix} prefix flags")]
    ProofShapeMismatch {
        /// Number of siblings (leaf included)
        siblings: usize,
        /// Number of prefix flags
        prefix: usize,
    },

    /// Proof could not be replayed or does not reach the expected root.
    #[error("Invalid merkle proof: {0}")]
    InvalidProof(String),

    /// Outbound message could not be shaped for the contract channel.
    #[error("Invalid contract message: {0}")]
    InvalidMessage(String),

    /// Leaf is not part of the tree.
    #[error("Leaf not found: {0}")]
    LeafNotFound(String),

    /// Header is not known to the chain or contract.
    #[error("Header not found: {0}")]
    HeaderNotFound(String),

    /// Transport failure while talking to a peer.
    #[error("Network error: {0}")]
    Network(String),

    /// A call exceeded its deadline.
    #[error("Call timed out after {0} ms")]
    Timeout(u64),

    /// Peer asked us to back off for a fixed number of seconds.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before the next attempt
        retry_after_secs: u64,
    },

    /// Contract execution rejected on chain.
    #[error("Execution failed with code {code}: {log}")]
    Execution {
        /// The request that was submitted
        request: String,
        /// Non-zero result code reported by the chain
        code: u32,
        /// Raw error string reported by the chain
        log: String,
    },

    /// Walk-back from chain best did not meet contract history within bound.
    #[error("Fork unresolved after walking back {walked} headers (bound {bound})")]
    ForkUnresolved {
        /// Headers walked
        walked: u64,
        /// Configured bound
        bound: u64,
    },

    /// Contract and chain disagree in a way the engine cannot repair.
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    /// Encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RelayerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyLeafSet
            | Self::IndexOutOfRange { .. }
            | Self::ProofShapeMismatch { .. }
            | Self::InvalidProof(_)
            | Self::InvalidMessage(_)
            | Self::Serialization(_) => ErrorKind::Validation,
            Self::LeafNotFound(_) | Self::HeaderNotFound(_) => ErrorKind::NotFound,
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => ErrorKind::Transient,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::ForkUnresolved { .. } | Self::Inconsistent(_) => ErrorKind::Consistency,
        }
    }

    /// Whether a read-only call failing with this error may be retried.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<serde_json::Error> for RelayerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
