mod address;
mod amount;
mod hashing;
mod merkle;
mod random;
pub mod signing;

pub use address::{Address, AssetId};
pub use amount::{BlockNumber, TokenAmount};
pub use hashing::{hash_bytes, hash_secret, Hashlock, Secret};
pub use merkle::compute_root as compute_locks_root;
pub use random::Random;
