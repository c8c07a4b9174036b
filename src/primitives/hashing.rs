use std::fmt;

use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 32-byte cryptographic hash `H(secret)` (§3).
#[derive(Clone, Copy, Deref, From, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hashlock([u8; 32]);

/// A 32-byte preimage; `H(secret) = hashlock` (§3).
#[derive(Clone, Copy, Deref, From, Eq, PartialEq, Serialize, Deserialize)]
pub struct Secret([u8; 32]);

impl Secret {
    /// Derives this secret's hashlock as `H(secret)`.
    pub fn hashlock(&self) -> Hashlock {
        Hashlock(hash_secret(&self.0))
    }
}

impl fmt::Debug for Hashlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hashlock(0x{})", hex::encode(self.0))
    }
}

// Secrets must never leak into logs or Debug output.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

pub fn hash_secret(secret: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.finalize().into()
}

/// Hash used for `msghash` (§4.3) and for leaves of the locks-root tree (§4.1).
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    hash_secret(data)
}
