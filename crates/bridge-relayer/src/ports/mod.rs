//! # Ports Module
//!
//! Hexagonal architecture ports: the inbound sync strategy and the outbound
//! chain and contract capabilities the engines depend on.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
