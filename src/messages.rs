//! Wire message family (component C's data half, §6): each message signs
//! over its own canonical byte encoding via the [`SignedMessage`] trait, and
//! the [`Message`] enum tags every kind for dispatch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitives::signing::{self, PrivateKey, Signature, SigningError};
use crate::primitives::{hash_bytes, Address, AssetId, BlockNumber, Hashlock, Secret, TokenAmount};

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("signature error: {0}")]
    Signing(#[from] SigningError),
    #[error("claimed sender {claimed} does not match recovered signer {recovered}")]
    SenderMismatch { claimed: Address, recovered: Address },
    #[error("message is not signed")]
    Unsigned,
}

/// First byte of every signable payload, keeping one message kind's
/// signature from verifying against another kind's bytes.
#[derive(Clone, Copy, Debug)]
enum CmdId {
    Ping = 1,
    DirectTransfer = 2,
    MediatedTransfer = 3,
    SecretRequest = 4,
    Secret = 5,
    TransferTimeout = 6,
    CancelTransfer = 7,
    RejectTransfer = 8,
}

trait SignedMessage {
    fn cmd_id(&self) -> CmdId;
    fn signable_fields(&self, out: &mut Vec<u8>);
    fn signature(&self) -> &[u8];
    fn set_signature(&mut self, signature: Vec<u8>);

    fn signable_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.cmd_id() as u8];
        self.signable_fields(&mut bytes);
        bytes
    }

    fn sign(&mut self, key: &PrivateKey) -> Result<(), MessageError> {
        let signature = key.sign(&self.signable_bytes())?;
        self.set_signature(signature.0.to_vec());
        Ok(())
    }

    fn sender(&self, claimed: Address) -> Result<Address, MessageError> {
        if self.signature().is_empty() {
            return Err(MessageError::Unsigned);
        }
        let signature = Signature::from_slice(self.signature())?;
        let recovered = signing::recover(&self.signable_bytes(), &signature)?;
        if recovered != claimed {
            return Err(MessageError::SenderMismatch { claimed, recovered });
        }
        Ok(recovered)
    }
}

macro_rules! push_all {
    ($out:expr, $($field:expr),+ $(,)?) => {
        $( $out.extend_from_slice($field); )+
    };
}

/// Liveness probe (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ping {
    pub sender: Address,
    pub nonce: u32,
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl SignedMessage for Ping {
    fn cmd_id(&self) -> CmdId {
        CmdId::Ping
    }
    fn signable_fields(&self, out: &mut Vec<u8>) {
        push_all!(out, self.sender.as_bytes(), &self.nonce.to_be_bytes());
    }
    fn signature(&self) -> &[u8] {
        &self.signature
    }
    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }
}

/// Unsigned acknowledgment: `echo` identifies the original message's hash (§4.3, §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ack {
    pub sender: Address,
    pub echo: [u8; 32],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectTransfer {
    pub sender: Address,
    pub nonce: u64,
    pub asset: AssetId,
    pub recipient: Address,
    pub transferred_amount: TokenAmount,
    pub locks_root: [u8; 32],
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl SignedMessage for DirectTransfer {
    fn cmd_id(&self) -> CmdId {
        CmdId::DirectTransfer
    }
    fn signable_fields(&self, out: &mut Vec<u8>) {
        push_all!(
            out,
            self.sender.as_bytes(),
            &self.nonce.to_be_bytes(),
            self.asset.as_bytes(),
            self.recipient.as_bytes(),
            &self.transferred_amount.0.to_be_bytes(),
            &self.locks_root,
        );
    }
    fn signature(&self) -> &[u8] {
        &self.signature
    }
    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }
}

/// `lock = (amount, expiration, hashlock)` (§6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LockFields {
    pub amount: TokenAmount,
    pub expiration: BlockNumber,
    pub hashlock: Hashlock,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediatedTransfer {
    pub sender: Address,
    pub nonce: u64,
    pub asset: AssetId,
    pub recipient: Address,
    pub transferred_amount: TokenAmount,
    pub locks_root: [u8; 32],
    pub target: Address,
    pub initiator: Address,
    pub lock: LockFields,
    pub fee: TokenAmount,
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl SignedMessage for MediatedTransfer {
    fn cmd_id(&self) -> CmdId {
        CmdId::MediatedTransfer
    }
    fn signable_fields(&self, out: &mut Vec<u8>) {
        push_all!(
            out,
            self.sender.as_bytes(),
            &self.nonce.to_be_bytes(),
            self.asset.as_bytes(),
            self.recipient.as_bytes(),
            &self.transferred_amount.0.to_be_bytes(),
            &self.locks_root,
            self.target.as_bytes(),
            self.initiator.as_bytes(),
            &self.lock.amount.0.to_be_bytes(),
            &self.lock.expiration.0.to_be_bytes(),
            &*self.lock.hashlock,
            &self.fee.0.to_be_bytes(),
        );
    }
    fn signature(&self) -> &[u8] {
        &self.signature
    }
    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }
}

/// Target -> initiator: reveals willingness to learn the secret (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecretRequest {
    pub sender: Address,
    pub hashlock: Hashlock,
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl SignedMessage for SecretRequest {
    fn cmd_id(&self) -> CmdId {
        CmdId::SecretRequest
    }
    fn signable_fields(&self, out: &mut Vec<u8>) {
        push_all!(out, self.sender.as_bytes(), &*self.hashlock);
    }
    fn signature(&self) -> &[u8] {
        &self.signature
    }
    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }
}

/// Propagates the preimage back along the path (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecretMessage {
    pub sender: Address,
    pub secret: Secret,
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl SignedMessage for SecretMessage {
    fn cmd_id(&self) -> CmdId {
        CmdId::Secret
    }
    fn signable_fields(&self, out: &mut Vec<u8>) {
        push_all!(out, self.sender.as_bytes(), &*self.secret);
    }
    fn signature(&self) -> &[u8] {
        &self.signature
    }
    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferTimeout {
    pub sender: Address,
    pub hashlock: Hashlock,
    pub echo: [u8; 32],
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl SignedMessage for TransferTimeout {
    fn cmd_id(&self) -> CmdId {
        CmdId::TransferTimeout
    }
    fn signable_fields(&self, out: &mut Vec<u8>) {
        push_all!(out, self.sender.as_bytes(), &*self.hashlock, &self.echo);
    }
    fn signature(&self) -> &[u8] {
        &self.signature
    }
    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CancelTransfer {
    pub sender: Address,
    pub hashlock: Hashlock,
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl SignedMessage for CancelTransfer {
    fn cmd_id(&self) -> CmdId {
        CmdId::CancelTransfer
    }
    fn signable_fields(&self, out: &mut Vec<u8>) {
        push_all!(out, self.sender.as_bytes(), &*self.hashlock);
    }
    fn signature(&self) -> &[u8] {
        &self.signature
    }
    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }
}

/// Negative ack: domain-level rejection of the message identified by `echo` (§4.3, §7).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RejectTransfer {
    pub sender: Address,
    pub echo: [u8; 32],
    pub reason_code: u16,
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl SignedMessage for RejectTransfer {
    fn cmd_id(&self) -> CmdId {
        CmdId::RejectTransfer
    }
    fn signable_fields(&self, out: &mut Vec<u8>) {
        push_all!(out, self.sender.as_bytes(), &self.echo, &self.reason_code.to_be_bytes());
    }
    fn signature(&self) -> &[u8] {
        &self.signature
    }
    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }
}

/// Tagged enum over every wire message kind, so dispatch is a single `match`
/// rather than a type-id lookup (§9 design notes).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    Ping(Ping),
    Ack(Ack),
    DirectTransfer(DirectTransfer),
    MediatedTransfer(MediatedTransfer),
    SecretRequest(SecretRequest),
    Secret(SecretMessage),
    TransferTimeout(TransferTimeout),
    CancelTransfer(CancelTransfer),
    RejectTransfer(RejectTransfer),
}

impl Message {
    pub fn sender(&self) -> Address {
        match self {
            Message::Ping(m) => m.sender,
            Message::Ack(m) => m.sender,
            Message::DirectTransfer(m) => m.sender,
            Message::MediatedTransfer(m) => m.sender,
            Message::SecretRequest(m) => m.sender,
            Message::Secret(m) => m.sender,
            Message::TransferTimeout(m) => m.sender,
            Message::CancelTransfer(m) => m.sender,
            Message::RejectTransfer(m) => m.sender,
        }
    }

    /// Signs in place, unless the message kind (`Ack`) is wire-unsigned (§6).
    pub fn sign(&mut self, key: &PrivateKey) -> Result<(), MessageError> {
        match self {
            Message::Ping(m) => m.sign(key),
            Message::Ack(_) => Ok(()),
            Message::DirectTransfer(m) => m.sign(key),
            Message::MediatedTransfer(m) => m.sign(key),
            Message::SecretRequest(m) => m.sign(key),
            Message::Secret(m) => m.sign(key),
            Message::TransferTimeout(m) => m.sign(key),
            Message::CancelTransfer(m) => m.sign(key),
            Message::RejectTransfer(m) => m.sign(key),
        }
    }

    /// Verifies the embedded signature recovers to the claimed `sender`
    /// (§6: "Signature verification must yield `sender`"). `Ack` carries no
    /// signature and is trusted as coming from whoever the transport
    /// attributes it to.
    pub fn verify(&self) -> Result<Address, MessageError> {
        match self {
            Message::Ping(m) => m.sender(m.sender),
            Message::Ack(m) => Ok(m.sender),
            Message::DirectTransfer(m) => m.sender(m.sender),
            Message::MediatedTransfer(m) => m.sender(m.sender),
            Message::SecretRequest(m) => m.sender(m.sender),
            Message::Secret(m) => m.sender(m.sender),
            Message::TransferTimeout(m) => m.sender(m.sender),
            Message::CancelTransfer(m) => m.sender(m.sender),
            Message::RejectTransfer(m) => m.sender(m.sender),
        }
    }

    /// Canonical length-prefix-ready wire encoding (§6).
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Message serialization is infallible")
    }

    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// `msghash = H(serialize(message))` (§4.3).
    pub fn msghash(&self) -> [u8; 32] {
        hash_bytes(&self.to_wire_bytes())
    }
}
