use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// An amount of a tracked asset, denominated in the asset's smallest unit.
#[derive(Copy, Clone, Debug, Default, Display, From, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TokenAmount(pub u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub fn checked_sub(self, rhs: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_sub(rhs.0).map(TokenAmount)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Add for TokenAmount {
    type Output = TokenAmount;

    fn add(self, rhs: TokenAmount) -> TokenAmount {
        TokenAmount(self.0 + rhs.0)
    }
}

impl AddAssign for TokenAmount {
    fn add_assign(&mut self, rhs: TokenAmount) {
        self.0 += rhs.0;
    }
}

impl Sub for TokenAmount {
    type Output = TokenAmount;

    fn sub(self, rhs: TokenAmount) -> TokenAmount {
        TokenAmount(self.0 - rhs.0)
    }
}

impl SubAssign for TokenAmount {
    fn sub_assign(&mut self, rhs: TokenAmount) {
        self.0 -= rhs.0;
    }
}

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = TokenAmount>>(iter: I) -> TokenAmount {
        iter.fold(TokenAmount::ZERO, Add::add)
    }
}

/// An absolute block number, as reported by the chain adapter (§6).
#[derive(Copy, Clone, Debug, Default, Display, From, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct BlockNumber(pub u64);

impl Add<u64> for BlockNumber {
    type Output = BlockNumber;

    fn add(self, rhs: u64) -> BlockNumber {
        BlockNumber(self.0 + rhs)
    }
}

impl Sub<BlockNumber> for BlockNumber {
    type Output = i128;

    fn sub(self, rhs: BlockNumber) -> i128 {
        self.0 as i128 - rhs.0 as i128
    }
}
