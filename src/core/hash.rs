// Hashing utilities

use sha2::{Digest, Sha256};
use crate::core::Hash256;

/// SHA256 double hash
/// hash256 = SHA256(SHA256(data))
pub fn hash256(data: &[u8]) -> Hash256 {
    let first_hash = Sha256::digest(data);
    let second_hash = Sha256::digest(first_hash);
    Hash256::new(second_hash.into())
}

/// Single SHA256 hash
pub fn sha256_hash(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Block header commitment.
///
/// The two hashes are concatenated as raw bytes; the integers are rendered as
/// decimal text. The block version is not committed.
pub fn block_header_hash(
    prev_block_hash: &Hash256,
    merkle_root: &Hash256,
    timestamp: i64,
    bits: u32,
    nonce: u64,
) -> Hash256 {
    let mut header = Vec::with_capacity(64 + 40);
    header.extend_from_slice(prev_block_hash.as_bytes());
    header.extend_from_slice(merkle_root.as_bytes());
    header.extend_from_slice(timestamp.to_string().as_bytes());
    header.extend_from_slice(bits.to_string().as_bytes());
    header.extend_from_slice(nonce.to_string().as_bytes());
    hash256(&header)
}
