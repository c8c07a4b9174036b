use thiserror::Error;

use crate::messages::MessageError;
use crate::primitives::Address;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("retransmission budget exhausted for peer {peer}")]
    UnreachablePeer { peer: Address },
    #[error("peer {peer} rejected the message (reason code {reason_code})")]
    Rejected { peer: Address, reason_code: u16 },
    #[error("message error: {0}")]
    Message(#[from] MessageError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// A domain-level rejection produced by a [`super::Dispatcher`], carried
/// back to the sender as a `RejectTransfer` negative ack (§4.3 step 4, §7).
#[derive(Clone, Debug)]
pub struct DispatchError {
    pub reason_code: u16,
    pub reason: String,
}

impl DispatchError {
    pub fn new(reason_code: u16, reason: impl Into<String>) -> Self {
        Self { reason_code, reason: reason.into() }
    }
}
