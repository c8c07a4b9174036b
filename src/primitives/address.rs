use std::fmt;
use std::str::FromStr;

use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};

use crate::errors::TypeError;

const ADDRESS_LEN: usize = 20;

/// A 20-byte opaque identifier for a node or contract.
///
/// The wire/RPC boundary is the only place this type's hex representation
/// matters; everywhere else it is carried as the raw bytes.
#[derive(Clone, Copy, Deref, From, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_LEN]);

/// A 20-byte identifier for a token/asset.
#[derive(Clone, Copy, Deref, From, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct AssetId([u8; ADDRESS_LEN]);

macro_rules! impl_hex_id {
    ($ty:ident) => {
        impl $ty {
            pub const fn zero() -> Self {
                Self([0u8; ADDRESS_LEN])
            }

            pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; ADDRESS_LEN]
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($ty), self)
            }
        }

        impl FromStr for $ty {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s).map_err(|e| TypeError {
                    msg: format!("invalid hex in {}: {}", stringify!($ty), e),
                })?;
                if bytes.len() != ADDRESS_LEN {
                    return Err(TypeError {
                        msg: format!("{} must be {} bytes, got {}", stringify!($ty), ADDRESS_LEN, bytes.len()),
                    });
                }
                let mut array = [0u8; ADDRESS_LEN];
                array.copy_from_slice(&bytes);
                Ok(Self(array))
            }
        }
    };
}

impl_hex_id!(Address);
impl_hex_id!(AssetId);
