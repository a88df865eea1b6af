//! Nonce validation.

use blake2::{Blake2b512, Digest};

use cinder_types::{U128, U256};

use crate::difficulty::derive_threshold;

/// Compute the comparison value for a `(root, nonce)` pair.
///
/// Same recipe as the search loop: Blake2b-512 over the 40-byte
/// `nonce_le ‖ root` buffer, the first 8 digest bytes read little-endian,
/// then byte-reversed.
pub fn work_value(root_hash: &U256, nonce: u64) -> u64 {
    let mut input = [0u8; 40];
    input[0..8].copy_from_slice(&nonce.to_le_bytes());
    input[8..40].copy_from_slice(root_hash.as_bytes());

    let digest = Blake2b512::digest(input);
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(low).swap_bytes()
}

/// Whether a nonce satisfies the threshold derived from `difficulty`.
pub fn validate_work(root_hash: &U256, nonce: u64, difficulty: U128) -> bool {
    work_value(root_hash, nonce) < derive_threshold(difficulty)
}
