use once_cell::sync::Lazy;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, SignOnly, VerifyOnly};
use thiserror::Error;

use crate::primitives::address::Address;
use crate::primitives::hashing::hash_bytes;

static SIGN_CONTEXT: Lazy<Secp256k1<SignOnly>> = Lazy::new(Secp256k1::signing_only);
static VERIFY_CONTEXT: Lazy<Secp256k1<VerifyOnly>> = Lazy::new(Secp256k1::verification_only);

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("message could not be hashed into a valid secp256k1 message: {0}")]
    InvalidMessage(secp256k1::Error),
    #[error("signature is malformed: {0}")]
    InvalidSignature(secp256k1::Error),
}

/// A 65-byte recoverable ECDSA signature: `r || s || recovery_id`.
#[derive(Clone, Eq, PartialEq)]
pub struct Signature(pub [u8; 65]);

impl Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SigningError> {
        let array: [u8; 65] = bytes
            .try_into()
            .map_err(|_| SigningError::InvalidSignature(secp256k1::Error::InvalidSignature))?;
        Ok(Self(array))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature(0x{})", hex::encode(self.0))
    }
}

/// Our private signing key.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SecretKey,
}

impl PrivateKey {
    pub fn new(inner: SecretKey) -> Self {
        Self { inner }
    }

    pub fn address(&self) -> Address {
        address_of(&PublicKey::from_secret_key(&SIGN_CONTEXT, &self.inner))
    }

    /// Signs the deterministic serialization of a message (§4.3, §6).
    pub fn sign(&self, data: &[u8]) -> Result<Signature, SigningError> {
        let digest = hash_bytes(data);
        let message = Message::from_slice(&digest).map_err(SigningError::InvalidMessage)?;
        let (recovery_id, compact) = SIGN_CONTEXT
            .sign_ecdsa_recoverable(&message, &self.inner)
            .serialize_compact();

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&compact);
        bytes[64] = recovery_id.to_i32() as u8;
        Ok(Signature(bytes))
    }
}

/// Recovers the signer's address from a signature over `data`, such that
/// "signature verification must yield `sender`" (§6) holds by construction:
/// a forged or corrupted signature recovers to a different address, which
/// the caller then rejects by comparing against the claimed sender.
pub fn recover(data: &[u8], signature: &Signature) -> Result<Address, SigningError> {
    let digest = hash_bytes(data);
    let message = Message::from_slice(&digest).map_err(SigningError::InvalidMessage)?;
    let recovery_id = RecoveryId::from_i32(signature.0[64] as i32).map_err(SigningError::InvalidSignature)?;
    let recoverable = RecoverableSignature::from_compact(&signature.0[..64], recovery_id)
        .map_err(SigningError::InvalidSignature)?;
    let public_key = VERIFY_CONTEXT
        .recover_ecdsa(&message, &recoverable)
        .map_err(SigningError::InvalidSignature)?;
    Ok(address_of(&public_key))
}

fn address_of(public_key: &PublicKey) -> Address {
    let serialized = public_key.serialize_uncompressed();
    let digest = hash_bytes(&serialized[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..]);
    Address::from(bytes)
}
