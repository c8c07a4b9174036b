use rand::RngCore;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaChaRng;
use serde::{Deserialize, Serialize};

use crate::primitives::Secret;

/// Deterministic-when-seeded source of message identifiers and secrets.
///
/// Threaded through the node so that tests can seed it for reproducibility.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Random(ChaChaRng);

impl Random {
    pub fn new() -> Self {
        Self(ChaChaRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(ChaChaRng::seed_from_u64(seed))
    }

    /// Next message identifier, used to correlate a send with its ack.
    pub fn next_message_identifier(&mut self) -> u32 {
        self.0.next_u32()
    }

    /// 32 random bytes used as a hash-lock preimage (§3 Secret).
    pub fn secret(&mut self) -> Secret {
        let mut bytes = [0u8; 32];
        self.0.fill_bytes(&mut bytes);
        Secret::from(bytes)
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new()
    }
}
