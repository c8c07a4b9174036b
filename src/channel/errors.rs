use thiserror::Error;

use crate::primitives::{Address, BlockNumber, Hashlock};

/// Channel-state rejections (§7).
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ChannelError {
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u128, requested: u128 },

    #[error("locks root mismatch: expected {expected:?}, computed {computed:?}")]
    InvalidLocksRoot { expected: [u8; 32], computed: [u8; 32] },

    #[error("unknown lock for hashlock {0:?}")]
    UnknownLock(Hashlock),

    #[error("lock expiration {expiration:?} is before the reveal-timeout floor {floor:?}")]
    ExpiredLock { expiration: BlockNumber, floor: BlockNumber },

    #[error("channel is closed")]
    ChannelClosed,

    #[error("reveal_timeout must be smaller than settle_timeout")]
    InvalidTimeouts,

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("no channel with partner {0}")]
    NoChannel(Address),
}
