//! Core of a peer-to-peer off-chain payment-channel network node.
//!
//! A node participates in a mesh of bidirectional payment channels, each
//! anchored by an on-chain netting contract. Off-chain transfers are signed
//! messages; the chain is only consulted to open, fund, settle or dispute a
//! channel (see [`chain`]). Payments can be routed through a multi-hop path
//! of intermediaries using hash-time-locked transfers (see [`transfer`]).

#[macro_use]
extern crate slog;

pub mod chain;
pub mod channel;
pub mod config;
pub mod constants;
pub mod errors;
pub mod graph;
pub mod messages;
pub mod node;
pub mod primitives;
pub mod protocol;
pub mod transfer;
pub mod transport;

pub use config::NodeConfig;
pub use errors::LockmeshError;
pub use node::Node;
