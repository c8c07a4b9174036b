//! The send-path pending-ack table (§4.3 Send protocol, §5 Backpressure):
//! shared between the send path (registers an entry, awaits its
//! completion) and the receive path (completes an entry when an `Ack` or
//! `RejectTransfer` arrives). Bounded per peer by a semaphore: when full,
//! new sends to that peer wait for an ack or retry slot to free (§5).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};

use crate::primitives::Address;

/// `Ok(())` on `Ack`, `Err(reason_code)` on `RejectTransfer` (§4.3 step 4).
pub type AckOutcome = Result<(), u16>;

struct Entry {
    notify: oneshot::Sender<AckOutcome>,
}

pub struct PendingAckTable {
    entries: Mutex<HashMap<(Address, [u8; 32]), Entry>>,
    semaphores: Mutex<HashMap<Address, Arc<Semaphore>>>,
    max_pending_per_peer: usize,
}

impl PendingAckTable {
    pub fn new(max_pending_per_peer: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            semaphores: Mutex::new(HashMap::new()),
            max_pending_per_peer: max_pending_per_peer.max(1),
        }
    }

    fn semaphore_for(&self, peer: Address) -> Arc<Semaphore> {
        self.semaphores
            .lock()
            .entry(peer)
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_pending_per_peer)))
            .clone()
    }

    /// Acquires a backpressure slot for `peer` and registers `(peer,
    /// msghash)` as pending. The returned permit must be held for the
    /// entry's lifetime; dropping it frees the slot for the next send.
    pub async fn register(&self, peer: Address, msghash: [u8; 32]) -> (OwnedSemaphorePermit, oneshot::Receiver<AckOutcome>) {
        let semaphore = self.semaphore_for(peer);
        let permit = semaphore.acquire_owned().await.expect("pending-ack semaphore is never closed");
        let (notify, receiver) = oneshot::channel();
        self.entries.lock().insert((peer, msghash), Entry { notify });
        (permit, receiver)
    }

    pub fn remove(&self, peer: Address, msghash: [u8; 32]) {
        self.entries.lock().remove(&(peer, msghash));
    }

    /// Completes the pending entry for `(peer, msghash)`, if any. Returns
    /// `false` for a duplicate ack or one that arrived after the entry
    /// already timed out and was dropped.
    pub fn complete(&self, peer: Address, msghash: [u8; 32], outcome: AckOutcome) -> bool {
        match self.entries.lock().remove(&(peer, msghash)) {
            Some(entry) => {
                let _ = entry.notify.send(outcome);
                true
            }
            None => false,
        }
    }
}
