//! # Adapters Layer
//!
//! Contract-side implementations of the outbound ports. Chain RPC clients
//! and the encrypted channel itself are provided by the embedding binary.

mod contract_client;
mod contracts;

pub use contract_client::ContractClient;
pub use contracts::{
    BtcLightClientContract, ConsensusLightClientContract, RelayHashContract,
    SUBMIT_HEADERS_ACTION,
};
