// Merkle root aggregation

use crate::core::{hash256, Hash256};

/// Calculate the merkle root of an ordered list of transaction ids.
///
/// - no leaves: the zero hash
/// - one leaf: the leaf itself
/// - odd level: the last element is duplicated before pairing
/// - each pair: hash256(left || right)
///
/// Every merkle root in the ledger goes through this function.
pub fn merkle_root(txids: &[Hash256]) -> Hash256 {
    if txids.is_empty() {
        return Hash256::zero();
    }

    let mut level: Vec<Hash256> = txids.to_vec();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }

        level = level
            .chunks(2)
            .map(|pair| {
                let mut combined = [0u8; 64];
                combined[..32].copy_from_slice(pair[0].as_bytes());
                combined[32..].copy_from_slice(pair[1].as_bytes());
                hash256(&combined)
            })
            .collect();
    }

    level[0]
}
