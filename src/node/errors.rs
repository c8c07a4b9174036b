use thiserror::Error;

use crate::chain::ChainError;
use crate::channel::ChannelError;
use crate::graph::GraphError;
use crate::primitives::{Address, AssetId};
use crate::protocol::ProtocolError;
use crate::transfer::TransferError;

/// The coordinator's public-API-facing error taxonomy (§4.5, §7).
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("asset {0} is not registered with this node")]
    UnknownAsset(AssetId),
    #[error("no channel with partner {0}")]
    UnknownChannel(Address),
    #[error("amount must be positive")]
    InvalidAmount,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// `close_channel` / `open_channel` / `exchange` are not implemented:
    /// their on-chain transition procedures are out of scope here rather
    /// than invented from nothing (§9 open questions).
    #[error("{operation} is not supported by this node")]
    Unsupported { operation: &'static str },
}
