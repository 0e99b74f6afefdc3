//! # Algorithms Module
//!
//! Merkle engines for both chains, header selection rules and message
//! padding. Everything here is synchronous and free of I/O.

pub mod btc_merkle;
pub mod hashing;
pub mod header_selection;
pub mod padding;
pub mod tm_merkle;

pub use hashing::{btc_hash_pair, empty_hash, inner_hash, leaf_hash, sha256, sha256d};
pub use header_selection::{
    estimate_gas, plan_batches, select_headers, should_include, walk_stop, HeaderArena,
    HeaderBatch, WalkStop,
};
pub use padding::{pad_message, PADDING_KEY};
