//! External unreliable-datagram transport and discovery collaborators (§6),
//! explicitly out of scope per §1: only their interfaces are specified
//! here as the `send_raw`/`on_raw` + `register`/`lookup` contract the
//! protocol engine and node coordinator need. No concrete UDP socket or
//! overlay-network client lives behind these traits.

use async_trait::async_trait;
use thiserror::Error;

use crate::primitives::Address;

/// Maximum frame size the transport is modeled as carrying (§6).
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum TransportError {
    #[error("frame of {actual} bytes exceeds the {max}-byte transport limit")]
    FrameTooLarge { max: usize, actual: usize },
    #[error("peer {0} could not be reached")]
    Unreachable(Address),
}

/// Unreliable datagram channel with address-based routing (§1, §6).
/// Ordering is not guaranteed and delivery is not guaranteed; the protocol
/// engine (component C) is responsible for acknowledgment and retry on top
/// of this contract.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_raw(&self, dest: Address, bytes: Vec<u8>) -> Result<(), TransportError>;
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DiscoveryError {
    #[error("address {0} is not registered with discovery")]
    NotRegistered(Address),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// Node discovery: maps an address to a `(host, port)` endpoint (§6).
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn register(&self, address: Address, host: String, port: u16) -> Result<(), DiscoveryError>;
    async fn lookup(&self, address: Address) -> Result<Endpoint, DiscoveryError>;
}
