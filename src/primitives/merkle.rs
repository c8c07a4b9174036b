//! Canonical locks-root Merkle scheme (resolves the §9 open question on tree
//! shape: a binary tree over `H(serialize(lock))` leaves in insertion order,
//! an odd trailing leaf promoted unchanged, empty set hashes to all-zeros).

use crate::primitives::hashing::hash_bytes;

pub const EMPTY_ROOT: [u8; 32] = [0u8; 32];

/// Computes the locks root over already-hashed, insertion-ordered leaves.
///
/// Leaves are the hash of each lock's canonical serialization; the caller
/// (`channel::transitions`) is responsible for producing them in the same
/// order both channel sides maintain, since the root is only meaningful when
/// both sides compute it from identical input.
pub fn compute_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return EMPTY_ROOT;
    }

    let mut level: Vec<[u8; 32]> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        let mut pairs = level.chunks(2);
        for pair in &mut pairs {
            match pair {
                [left, right] => {
                    let mut combined = Vec::with_capacity(64);
                    combined.extend_from_slice(left);
                    combined.extend_from_slice(right);
                    next.push(hash_bytes(&combined));
                }
                [single] => next.push(*single),
                _ => unreachable!("chunks(2) never yields more than two elements"),
            }
        }
        level = next;
    }
    level[0]
}
