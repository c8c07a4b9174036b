//! Message protocol engine (component C): frames, signs, verifies,
//! deduplicates, acknowledges and retransmits wire messages (§4.3) over a
//! `tokio::select!` event loop.

mod dedup;
mod errors;
mod pending;

pub use errors::{DispatchError, ProtocolError};

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use slog::Logger;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::messages::{Ack, Message, RejectTransfer};
use crate::primitives::signing::PrivateKey;
use crate::primitives::Address;
use crate::transport::{Transport, TransportError, MAX_FRAME_BYTES};

use dedup::DedupCache;
use pending::PendingAckTable;

/// The coordinator's inbound-delivery capability, injected into the engine
/// so that `protocol` need not depend on the concrete `Node` type (§9:
/// "channels receive the coordinator's outbound-message capability as an
/// injected collaborator" — the same pattern applied at the protocol/node
/// seam).
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, message: Message) -> Result<(), DispatchError>;
}

pub struct ProtocolEngine {
    address: Address,
    private_key: PrivateKey,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<dyn Dispatcher>,
    retry: RetryConfig,
    pending: PendingAckTable,
    dedup: Mutex<DedupCache>,
    log: Logger,
}

impl ProtocolEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        private_key: PrivateKey,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<dyn Dispatcher>,
        retry: RetryConfig,
        dedup_lru_capacity: usize,
        max_pending_per_peer: usize,
        log: Logger,
    ) -> Self {
        Self {
            address,
            private_key,
            transport,
            dispatcher,
            retry,
            pending: PendingAckTable::new(max_pending_per_peer),
            dedup: Mutex::new(DedupCache::new(dedup_lru_capacity)),
            log,
        }
    }

    /// Signs `message` (unless it is the wire-unsigned `Ack` kind) and
    /// sends it to `recipient`, retrying with exponential backoff until an
    /// `Ack`/`RejectTransfer` arrives or the retry budget is exhausted
    /// (§4.3 Send protocol).
    pub async fn send(&self, recipient: Address, mut message: Message) -> Result<(), ProtocolError> {
        message.sign(&self.private_key)?;
        let bytes = message.to_wire_bytes();
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::Transport(TransportError::FrameTooLarge {
                max: MAX_FRAME_BYTES,
                actual: bytes.len(),
            }));
        }
        let msghash = message.msghash();

        let (_permit, mut ack_rx) = self.pending.register(recipient, msghash).await;

        let mut delay = self.retry.base_delay;
        for attempt in 0..=self.retry.max_retries {
            if let Err(err) = self.transport.send_raw(recipient, bytes.clone()).await {
                debug!(self.log, "send_raw failed, will retry"; "recipient" => %recipient, "attempt" => attempt, "error" => %err);
            }

            tokio::select! {
                outcome = &mut ack_rx => {
                    self.pending.remove(recipient, msghash);
                    return match outcome {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(reason_code)) => Err(ProtocolError::Rejected { peer: recipient, reason_code }),
                        Err(_) => Err(ProtocolError::UnreachablePeer { peer: recipient }),
                    };
                }
                _ = sleep(delay) => {
                    delay = (delay * self.retry.backoff_factor).min(self.retry.max_delay);
                }
            }
        }

        self.pending.remove(recipient, msghash);
        warn!(self.log, "peer unreachable after retry budget exhausted"; "recipient" => %recipient);
        Err(ProtocolError::UnreachablePeer { peer: recipient })
    }

    /// Deserializes, verifies, dedups, dispatches, and acks/rejects an
    /// inbound raw frame (§4.3 Receive protocol). Signature or
    /// deserialization failures are silently dropped (§7 propagation
    /// policy); everything else yields exactly one dispatch and exactly
    /// one ack or reject per distinct `(sender, msghash)` (§8 idempotence laws).
    pub async fn on_raw(&self, bytes: Vec<u8>) {
        let message = match Message::from_wire_bytes(&bytes) {
            Ok(message) => message,
            Err(err) => {
                debug!(self.log, "dropping undecodable frame"; "error" => %err);
                return;
            }
        };

        let sender = match message.verify() {
            Ok(sender) => sender,
            Err(err) => {
                debug!(self.log, "dropping message with invalid signature"; "error" => %err);
                return;
            }
        };

        let msghash = message.msghash();

        match &message {
            Message::Ack(Ack { echo, .. }) => {
                self.pending.complete(sender, *echo, Ok(()));
                return;
            }
            Message::RejectTransfer(reject) => {
                self.pending.complete(sender, reject.echo, Err(reject.reason_code));
                return;
            }
            _ => {}
        }

        let cache_key = (sender, msghash);
        if let Some(cached_response) = self.dedup.lock().get(&cache_key).cloned() {
            debug!(self.log, "duplicate delivery, re-emitting cached response"; "sender" => %sender);
            let _ = self.transport.send_raw(sender, cached_response).await;
            return;
        }

        match self.dispatcher.dispatch(message).await {
            Ok(()) => {
                let mut ack = Message::Ack(Ack { sender: self.address, echo: msghash });
                let _ = ack.sign(&self.private_key);
                let ack_bytes = ack.to_wire_bytes();
                self.dedup.lock().insert(cache_key, ack_bytes.clone());
                let _ = self.transport.send_raw(sender, ack_bytes).await;
            }
            Err(domain_error) => {
                debug!(self.log, "rejecting message"; "sender" => %sender, "reason" => %domain_error.reason);
                let mut reject = Message::RejectTransfer(RejectTransfer {
                    sender: self.address,
                    echo: msghash,
                    reason_code: domain_error.reason_code,
                    signature: Vec::new(),
                });
                if let Err(err) = reject.sign(&self.private_key) {
                    error!(self.log, "failed to sign rejection, dropping"; "error" => %err);
                    return;
                }
                let reject_bytes = reject.to_wire_bytes();
                self.dedup.lock().insert(cache_key, reject_bytes.clone());
                let _ = self.transport.send_raw(sender, reject_bytes).await;
            }
        }
    }
}
