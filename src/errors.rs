//! Top-level error facade composed from each subsystem's own error enum
//! (§7 Error taxonomy).

use thiserror::Error;

use crate::channel::ChannelError;
use crate::graph::GraphError;
use crate::node::NodeError;
use crate::protocol::ProtocolError;
use crate::transfer::TransferError;

/// Malformed identifier, e.g. the wrong byte length at a wire/RPC boundary.
#[derive(Error, Debug, Clone)]
#[error("{msg}")]
pub struct TypeError {
    pub msg: String,
}

/// Umbrella error returned by [`crate::Node`]'s public API.
#[derive(Error, Debug)]
pub enum LockmeshError {
    #[error("invalid identifier: {0}")]
    Type(#[from] TypeError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Node(#[from] NodeError),
}
