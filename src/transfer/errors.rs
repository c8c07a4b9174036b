use thiserror::Error;

use crate::channel::ChannelError;
use crate::graph::GraphError;
use crate::protocol::ProtocolError;

/// Transfer-task-level failures (§4.4, §7), distinct from the channel- and
/// protocol-level errors they are often triggered by.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("no path from this node to the target")]
    NoPath,
    #[error("no candidate path had a channel with sufficient balance")]
    InsufficientBalance,
    #[error("no SecretRequest arrived within the per-hop deadline")]
    Timeout,
    #[error("a downstream participant cancelled the transfer")]
    Cancelled,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
