//! Bounded cache of recently delivered `(sender, msghash)` pairs (§4.3
//! Receive protocol, step 3). Evicts in FIFO order rather than true
//! recency order, which is sufficient to bound memory for this crate's
//! in-memory, single-process node.

use std::collections::{HashMap, VecDeque};

use crate::primitives::Address;

pub type DedupKey = (Address, [u8; 32]);

pub struct DedupCache {
    capacity: usize,
    order: VecDeque<DedupKey>,
    acks: HashMap<DedupKey, Vec<u8>>,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), order: VecDeque::new(), acks: HashMap::new() }
    }

    pub fn get(&self, key: &DedupKey) -> Option<&Vec<u8>> {
        self.acks.get(key)
    }

    /// Records `key` as delivered, caching the ack/reject bytes so a
    /// retransmit re-emits the same response instead of re-dispatching.
    pub fn insert(&mut self, key: DedupKey, response_bytes: Vec<u8>) {
        if self.acks.insert(key, response_bytes).is_none() {
            self.order.push_back(key);
            if self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.acks.remove(&oldest);
                }
            }
        }
    }
}
