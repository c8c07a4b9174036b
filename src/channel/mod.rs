//! Per-channel balance/lock accounting (component A, §3, §4.1).
//!
//! Both sides of a channel share one `ChannelEndState` shape; there is no
//! separate signed/unsigned balance-proof split, since the protocol engine
//! (§4.3) owns signing uniformly.

mod errors;
mod transitions;

pub use errors::ChannelError;
pub use transitions::{PreparedDirectTransfer, PreparedMediatedTransfer};

use serde::{Deserialize, Serialize};

use crate::primitives::{compute_locks_root, Address, AssetId, BlockNumber, Hashlock, Secret, TokenAmount};

/// `(amount, expiration_block, hashlock)` (§3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub amount: TokenAmount,
    pub expiration: BlockNumber,
    pub hashlock: Hashlock,
}

impl Lock {
    /// Canonical serialization hashed to form a locks-root leaf (§4.1).
    fn leaf_hash(&self) -> [u8; 32] {
        let mut bytes = Vec::with_capacity(16 + 8 + 32);
        bytes.extend_from_slice(&self.amount.0.to_be_bytes());
        bytes.extend_from_slice(&self.expiration.0.to_be_bytes());
        bytes.extend_from_slice(&*self.hashlock);
        crate::primitives::hash_bytes(&bytes)
    }
}

/// Which side of a channel a balance-updating message concerns.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Side {
    Ours,
    Partner,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Ours => Side::Partner,
            Side::Partner => Side::Ours,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelEndState {
    pub address: Address,
    pub contract_balance: TokenAmount,
    pub transferred_amount: TokenAmount,
    pub pending_locks: Vec<Lock>,
    pub nonce: u64,
}

impl ChannelEndState {
    pub fn new(address: Address, contract_balance: TokenAmount) -> Self {
        Self {
            address,
            contract_balance,
            transferred_amount: TokenAmount::ZERO,
            pending_locks: Vec::new(),
            nonce: 0,
        }
    }

    /// Merkle root over `pending_locks`'s canonical serialization, in
    /// insertion order (§3, §4.1).
    pub fn locks_root(&self) -> [u8; 32] {
        let leaves: Vec<[u8; 32]> = self.pending_locks.iter().map(Lock::leaf_hash).collect();
        compute_locks_root(&leaves)
    }

    pub fn locked_amount(&self) -> TokenAmount {
        self.pending_locks.iter().map(|lock| lock.amount).sum()
    }

    pub fn next_nonce(&self) -> u64 {
        self.nonce + 1
    }

    fn pending_lock_index(&self, hashlock: Hashlock) -> Option<usize> {
        self.pending_locks.iter().position(|lock| lock.hashlock == hashlock)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ChannelStatus {
    Opened,
    Closed,
    Settled,
}

/// Off-chain accounting structure for bilateral payments between two
/// addresses, anchored by one on-chain netting contract (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Channel {
    pub asset_id: AssetId,
    pub contract_address: Address,
    pub our_state: ChannelEndState,
    pub partner_state: ChannelEndState,
    pub reveal_timeout: u64,
    pub settle_timeout: u64,
    pub status: ChannelStatus,
}

impl Channel {
    pub fn new(
        asset_id: AssetId,
        contract_address: Address,
        our_state: ChannelEndState,
        partner_state: ChannelEndState,
        reveal_timeout: u64,
        settle_timeout: u64,
    ) -> Result<Self, ChannelError> {
        if reveal_timeout == 0 || settle_timeout <= reveal_timeout {
            return Err(ChannelError::InvalidTimeouts);
        }

        Ok(Self {
            asset_id,
            contract_address,
            our_state,
            partner_state,
            reveal_timeout,
            settle_timeout,
            status: ChannelStatus::Opened,
        })
    }

    fn end_state(&self, side: Side) -> &ChannelEndState {
        match side {
            Side::Ours => &self.our_state,
            Side::Partner => &self.partner_state,
        }
    }

    fn end_state_mut(&mut self, side: Side) -> &mut ChannelEndState {
        match side {
            Side::Ours => &mut self.our_state,
            Side::Partner => &mut self.partner_state,
        }
    }

    pub fn expected_nonce(&self, side: Side) -> u64 {
        self.end_state(side).next_nonce()
    }

    /// `contract_balance + partner.transferred_amount − transferred_amount
    /// − sum(pending_locks.amount)` for the given side (§3 invariant).
    pub fn available_balance(&self, side: Side) -> TokenAmount {
        let (end, other) = match side {
            Side::Ours => (&self.our_state, &self.partner_state),
            Side::Partner => (&self.partner_state, &self.our_state),
        };
        let credit = end.contract_balance + other.transferred_amount;
        let debit = end.transferred_amount + end.locked_amount();
        credit.checked_sub(debit).unwrap_or(TokenAmount::ZERO)
    }

    pub fn is_usable_for_new_transfer(&self, amount: TokenAmount) -> bool {
        self.status == ChannelStatus::Opened && !amount.is_zero() && self.available_balance(Side::Ours) >= amount
    }

    pub fn create_direct_transfer(&mut self, amount: TokenAmount) -> Result<PreparedDirectTransfer, ChannelError> {
        transitions::create_direct_transfer(self, amount)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_mediated_transfer(
        &mut self,
        amount: TokenAmount,
        hashlock: Hashlock,
        expiration: BlockNumber,
        target: Address,
        initiator: Address,
        fee: TokenAmount,
        current_block: BlockNumber,
    ) -> Result<PreparedMediatedTransfer, ChannelError> {
        transitions::create_mediated_transfer(self, amount, hashlock, expiration, target, initiator, fee, current_block)
    }

    /// Applies an inbound or outbound balance-update message (§4.1).
    pub fn register_transfer(
        &mut self,
        side: Side,
        nonce: u64,
        transferred_amount: TokenAmount,
        locks_root: [u8; 32],
        new_lock: Option<Lock>,
        current_block: BlockNumber,
    ) -> Result<(), ChannelError> {
        transitions::register_transfer(self, side, nonce, transferred_amount, locks_root, new_lock, current_block)
    }

    /// Idempotent: settles the lock into the revealer's counterpart side on
    /// first application, no-ops afterward (§4.1, §8 idempotence laws).
    pub fn register_secret(&mut self, secret: Secret) -> bool {
        transitions::register_secret(self, secret)
    }

    /// Removes locks whose `expiration_block <= current_block`, returning
    /// them; their amount reverts to the sender by construction (the amount
    /// was never moved to `transferred_amount`, so removing the lock alone
    /// restores `available_balance`) (§3, §4.1).
    pub fn expire_locks(&mut self, current_block: BlockNumber) -> Vec<Lock> {
        transitions::expire_locks(self, current_block)
    }

    pub fn close(&mut self) {
        self.status = ChannelStatus::Closed;
    }

    pub fn settle(&mut self) {
        self.status = ChannelStatus::Settled;
    }
}
