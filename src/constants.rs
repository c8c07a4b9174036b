use std::time::Duration;

use crate::primitives::BlockNumber;

/// Minimum safety margin a receiver needs to act on a revealed secret (§3, §4.1).
pub const MIN_REVEAL_TIMEOUT: u64 = 1;
pub const DEFAULT_REVEAL_TIMEOUT: u64 = 50;
pub const DEFAULT_SETTLE_TIMEOUT: u64 = 500;

/// Protocol engine retry budget (§4.3 Send protocol, step 4).
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
pub const RETRY_BACKOFF_FACTOR: u32 = 2;
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);
pub const MAX_RETRIES: u32 = 5;

/// Bound on the receive-side dedup LRU (§4.3 Receive protocol, step 3).
pub const DEDUP_LRU_CAPACITY: usize = 8192;

/// Default `K` for the graph's k-shortest-path queries (§4.2).
pub const DEFAULT_MAX_PATHS: usize = 4;

/// Per-hop timeout budget for an in-flight mediated transfer (§4.4).
pub const DEFAULT_TIMEOUT_PER_HOP: Duration = Duration::from_secs(30);

/// Bound on the per-peer pending-ack table (§5 Backpressure).
pub const MAX_PENDING_PER_PEER: usize = 160;

pub fn reveal_timeout_floor(current_block: BlockNumber, reveal_timeout: u64) -> BlockNumber {
    current_block + reveal_timeout
}
