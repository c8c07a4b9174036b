//! Pure state-transition functions for [`super::Channel`]: each function
//! here takes the channel and the fields of an inbound or outbound message
//! and either mutates the channel in place or returns a [`ChannelError`].

use crate::constants::reveal_timeout_floor;
use crate::primitives::{Address, BlockNumber, Hashlock, Secret, TokenAmount};

use super::{Channel, ChannelError, ChannelStatus, Lock, Side};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PreparedDirectTransfer {
    pub nonce: u64,
    pub transferred_amount: TokenAmount,
    pub locks_root: [u8; 32],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PreparedMediatedTransfer {
    pub nonce: u64,
    pub transferred_amount: TokenAmount,
    pub locks_root: [u8; 32],
    pub lock: Lock,
    pub target: Address,
    pub initiator: Address,
    pub fee: TokenAmount,
}

fn require_open(channel: &Channel) -> Result<(), ChannelError> {
    if channel.status != ChannelStatus::Opened {
        return Err(ChannelError::ChannelClosed);
    }
    Ok(())
}

fn require_affordable(channel: &Channel, amount: TokenAmount) -> Result<(), ChannelError> {
    if amount.is_zero() {
        return Err(ChannelError::InvalidAmount);
    }
    let available = channel.available_balance(Side::Ours);
    if available < amount {
        return Err(ChannelError::InsufficientBalance {
            available: available.0,
            requested: amount.0,
        });
    }
    Ok(())
}

pub(super) fn create_direct_transfer(channel: &mut Channel, amount: TokenAmount) -> Result<PreparedDirectTransfer, ChannelError> {
    require_open(channel)?;
    require_affordable(channel, amount)?;

    let our = &mut channel.our_state;
    our.transferred_amount += amount;
    our.nonce = our.next_nonce();

    Ok(PreparedDirectTransfer {
        nonce: our.nonce,
        transferred_amount: our.transferred_amount,
        locks_root: our.locks_root(),
    })
}

#[allow(clippy::too_many_arguments)]
pub(super) fn create_mediated_transfer(
    channel: &mut Channel,
    amount: TokenAmount,
    hashlock: Hashlock,
    expiration: BlockNumber,
    target: Address,
    initiator: Address,
    fee: TokenAmount,
    current_block: BlockNumber,
) -> Result<PreparedMediatedTransfer, ChannelError> {
    require_open(channel)?;
    require_affordable(channel, amount)?;

    let floor = reveal_timeout_floor(current_block, channel.reveal_timeout);
    if expiration < floor {
        return Err(ChannelError::ExpiredLock { expiration, floor });
    }

    let lock = Lock { amount, expiration, hashlock };

    let our = &mut channel.our_state;
    our.pending_locks.push(lock);
    our.nonce = our.next_nonce();

    Ok(PreparedMediatedTransfer {
        nonce: our.nonce,
        transferred_amount: our.transferred_amount,
        locks_root: our.locks_root(),
        lock,
        target,
        initiator,
        fee,
    })
}

pub(super) fn register_transfer(
    channel: &mut Channel,
    side: Side,
    nonce: u64,
    transferred_amount: TokenAmount,
    locks_root: [u8; 32],
    new_lock: Option<Lock>,
    current_block: BlockNumber,
) -> Result<(), ChannelError> {
    require_open(channel)?;

    if let Some(lock) = new_lock {
        let floor = reveal_timeout_floor(current_block, channel.reveal_timeout);
        if lock.expiration < floor {
            return Err(ChannelError::ExpiredLock { expiration: lock.expiration, floor });
        }
    }

    let end = channel.end_state(side);
    let expected = end.next_nonce();
    if nonce != expected {
        return Err(ChannelError::NonceMismatch { expected, got: nonce });
    }
    if transferred_amount < end.transferred_amount {
        return Err(ChannelError::InsufficientBalance {
            available: end.transferred_amount.0,
            requested: transferred_amount.0,
        });
    }

    let mut pending = end.pending_locks.clone();
    if let Some(lock) = new_lock {
        pending.push(lock);
    }

    let opposite_transferred = channel.end_state(side.opposite()).transferred_amount;
    let new_locked: TokenAmount = pending.iter().map(|lock| lock.amount).sum();
    let credit = end.contract_balance + opposite_transferred;
    let debit = transferred_amount + new_locked;
    if credit < debit {
        return Err(ChannelError::InsufficientBalance { available: credit.0, requested: debit.0 });
    }

    let leaves: Vec<[u8; 32]> = pending.iter().map(|lock| {
        let mut bytes = Vec::with_capacity(16 + 8 + 32);
        bytes.extend_from_slice(&lock.amount.0.to_be_bytes());
        bytes.extend_from_slice(&lock.expiration.0.to_be_bytes());
        bytes.extend_from_slice(&*lock.hashlock);
        crate::primitives::hash_bytes(&bytes)
    }).collect();
    let computed = crate::primitives::compute_locks_root(&leaves);
    if computed != locks_root {
        return Err(ChannelError::InvalidLocksRoot { expected: locks_root, computed });
    }

    let end = channel.end_state_mut(side);
    end.transferred_amount = transferred_amount;
    end.pending_locks = pending;
    end.nonce = nonce;

    Ok(())
}

/// Settles the lock matching `secret`'s hashlock on whichever end holds it,
/// crediting its amount to that end's `transferred_amount`. No-ops (returns
/// `false`) if no pending lock matches, including on repeat application
/// (§8 idempotence laws).
pub(super) fn register_secret(channel: &mut Channel, secret: Secret) -> bool {
    let hashlock = secret.hashlock();
    let mut changed = false;

    for side in [Side::Ours, Side::Partner] {
        if let Some(idx) = channel.end_state(side).pending_lock_index(hashlock) {
            let end = channel.end_state_mut(side);
            let lock = end.pending_locks.remove(idx);
            end.transferred_amount += lock.amount;
            changed = true;
        }
    }

    changed
}

pub(super) fn expire_locks(channel: &mut Channel, current_block: BlockNumber) -> Vec<Lock> {
    let mut expired = Vec::new();

    for side in [Side::Ours, Side::Partner] {
        let end = channel.end_state_mut(side);
        let mut kept = Vec::with_capacity(end.pending_locks.len());
        for lock in end.pending_locks.drain(..) {
            if lock.expiration <= current_block {
                expired.push(lock);
            } else {
                kept.push(lock);
            }
        }
        end.pending_locks = kept;
    }

    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::tests::opened_channel;

    #[test]
    fn direct_transfer_moves_amount_and_bumps_nonce() {
        let mut channel = opened_channel(100);
        let prepared = channel.create_direct_transfer(TokenAmount(30)).unwrap();
        assert_eq!(prepared.nonce, 1);
        assert_eq!(prepared.transferred_amount, TokenAmount(30));
        assert_eq!(channel.available_balance(Side::Ours), TokenAmount(70));
    }

    #[test]
    fn direct_transfer_rejects_overdraft() {
        let mut channel = opened_channel(10);
        let err = channel.create_direct_transfer(TokenAmount(11)).unwrap_err();
        assert!(matches!(err, ChannelError::InsufficientBalance { .. }));
    }

    #[test]
    fn mediated_transfer_locks_funds_without_moving_transferred_amount() {
        let mut channel = opened_channel(100);
        let secret = Secret::from([7u8; 32]);
        let prepared = channel
            .create_mediated_transfer(
                TokenAmount(40),
                secret.hashlock(),
                BlockNumber(1000),
                channel.partner_state.address,
                channel.our_state.address,
                TokenAmount(0),
                BlockNumber(1),
            )
            .unwrap();
        assert_eq!(prepared.lock.amount, TokenAmount(40));
        assert_eq!(channel.available_balance(Side::Ours), TokenAmount(60));
        assert_eq!(channel.our_state.transferred_amount, TokenAmount(0));
    }

    #[test]
    fn mediated_transfer_rejects_expiration_inside_reveal_timeout() {
        let mut channel = opened_channel(100);
        let secret = Secret::from([7u8; 32]);
        let err = channel
            .create_mediated_transfer(
                TokenAmount(40),
                secret.hashlock(),
                BlockNumber(5),
                channel.partner_state.address,
                channel.our_state.address,
                TokenAmount(0),
                BlockNumber(1),
            )
            .unwrap_err();
        assert!(matches!(err, ChannelError::ExpiredLock { .. }));
    }

    #[test]
    fn mediated_transfer_accepts_expiration_exactly_at_the_reveal_timeout_floor() {
        // reveal_timeout is 10 (see `opened_channel`), current_block is 1, so the floor is 11.
        let mut channel = opened_channel(100);
        let secret = Secret::from([7u8; 32]);
        let prepared = channel
            .create_mediated_transfer(
                TokenAmount(40),
                secret.hashlock(),
                BlockNumber(11),
                channel.partner_state.address,
                channel.our_state.address,
                TokenAmount(0),
                BlockNumber(1),
            )
            .unwrap();
        assert_eq!(prepared.lock.expiration, BlockNumber(11));
    }

    #[test]
    fn mediated_transfer_rejects_expiration_one_block_below_the_floor() {
        let mut channel = opened_channel(100);
        let secret = Secret::from([7u8; 32]);
        let err = channel
            .create_mediated_transfer(
                TokenAmount(40),
                secret.hashlock(),
                BlockNumber(10),
                channel.partner_state.address,
                channel.our_state.address,
                TokenAmount(0),
                BlockNumber(1),
            )
            .unwrap_err();
        assert!(matches!(err, ChannelError::ExpiredLock { .. }));
    }

    #[test]
    fn register_transfer_accepts_a_new_lock_expiring_exactly_at_the_reveal_timeout_floor() {
        let mut channel = opened_channel(100);
        let lock = Lock { amount: TokenAmount(10), expiration: BlockNumber(11), hashlock: Hashlock::from([3u8; 32]) };
        let mut pending = channel.partner_state.pending_locks.clone();
        pending.push(lock);
        let leaves: Vec<[u8; 32]> = pending
            .iter()
            .map(|l| {
                let mut bytes = Vec::with_capacity(16 + 8 + 32);
                bytes.extend_from_slice(&l.amount.0.to_be_bytes());
                bytes.extend_from_slice(&l.expiration.0.to_be_bytes());
                bytes.extend_from_slice(&*l.hashlock);
                crate::primitives::hash_bytes(&bytes)
            })
            .collect();
        let locks_root = crate::primitives::compute_locks_root(&leaves);

        channel
            .register_transfer(Side::Partner, 1, TokenAmount(0), locks_root, Some(lock), BlockNumber(1))
            .unwrap();
        assert_eq!(channel.partner_state.pending_locks, vec![lock]);
    }

    #[test]
    fn register_transfer_rejects_a_new_lock_one_block_below_the_reveal_timeout_floor() {
        let mut channel = opened_channel(100);
        let lock = Lock { amount: TokenAmount(10), expiration: BlockNumber(10), hashlock: Hashlock::from([3u8; 32]) };
        let err = channel
            .register_transfer(Side::Partner, 1, TokenAmount(0), channel.partner_state.locks_root(), Some(lock), BlockNumber(1))
            .unwrap_err();
        assert!(matches!(err, ChannelError::ExpiredLock { .. }));
    }

    #[test]
    fn register_secret_settles_the_lock_and_is_idempotent() {
        let mut channel = opened_channel(100);
        let secret = Secret::from([7u8; 32]);
        channel
            .create_mediated_transfer(
                TokenAmount(40),
                secret.hashlock(),
                BlockNumber(1000),
                channel.partner_state.address,
                channel.our_state.address,
                TokenAmount(0),
                BlockNumber(1),
            )
            .unwrap();

        assert!(channel.register_secret(secret));
        assert_eq!(channel.our_state.transferred_amount, TokenAmount(40));
        assert!(channel.our_state.pending_locks.is_empty());

        assert!(!channel.register_secret(secret));
    }

    #[test]
    fn expire_locks_frees_available_balance() {
        let mut channel = opened_channel(100);
        let secret = Secret::from([7u8; 32]);
        channel
            .create_mediated_transfer(
                TokenAmount(40),
                secret.hashlock(),
                BlockNumber(20),
                channel.partner_state.address,
                channel.our_state.address,
                TokenAmount(0),
                BlockNumber(1),
            )
            .unwrap();
        assert_eq!(channel.available_balance(Side::Ours), TokenAmount(60));

        let expired = channel.expire_locks(BlockNumber(25));
        assert_eq!(expired.len(), 1);
        assert_eq!(channel.available_balance(Side::Ours), TokenAmount(100));
    }

    #[test]
    fn register_transfer_rejects_nonce_mismatch() {
        let mut channel = opened_channel(100);
        let err = channel
            .register_transfer(Side::Partner, 5, TokenAmount(10), channel.partner_state.locks_root(), None, BlockNumber(1))
            .unwrap_err();
        assert!(matches!(err, ChannelError::NonceMismatch { expected: 1, got: 5 }));
    }

    #[test]
    fn register_transfer_applies_a_matching_direct_transfer() {
        let mut channel = opened_channel(100);
        let locks_root = channel.partner_state.locks_root();
        channel
            .register_transfer(Side::Partner, 1, TokenAmount(25), locks_root, None, BlockNumber(1))
            .unwrap();
        assert_eq!(channel.partner_state.transferred_amount, TokenAmount(25));
        assert_eq!(channel.available_balance(Side::Ours), TokenAmount(125));
    }
}
