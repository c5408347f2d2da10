// Block validation rules

use crate::consensus::pow::PowError;
use crate::core::{Block, Hash256};
use thiserror::Error;

/// Reasons a block is refused by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("previous block hash mismatch: expected {expected}, got {found}")]
    PrevHashMismatch { expected: Hash256, found: Hash256 },
    #[error("timestamp must be greater than previous block ({candidate} <= {tip})")]
    NonIncreasingTimestamp { tip: i64, candidate: i64 },
    #[error("proof of work verification failed")]
    InvalidProofOfWork,
    #[error("{0}")]
    InvalidBits(PowError),
    #[error("merkle root does not match transactions")]
    MerkleRootMismatch,
}

/// Block validator
pub struct BlockValidator;

impl BlockValidator {
    /// Validate `candidate` as the next block after `tip`.
    ///
    /// Rules are checked in order: linkage, timestamp, proof of work,
    /// merkle commitment. The first failure is returned.
    pub fn validate_next(tip: &Block, candidate: &Block) -> Result<(), ValidationError> {
        let expected = tip.hash();
        if candidate.prev_block_hash() != expected {
            return Err(ValidationError::PrevHashMismatch {
                expected,
                found: candidate.prev_block_hash(),
            });
        }

        if candidate.timestamp() <= tip.timestamp() {
            return Err(ValidationError::NonIncreasingTimestamp {
                tip: tip.timestamp(),
                candidate: candidate.timestamp(),
            });
        }

        Self::validate_standalone(candidate)
    }

    /// Validate a block with no predecessor (genesis insertion)
    pub fn validate_genesis(block: &Block) -> Result<(), ValidationError> {
        Self::validate_standalone(block)
    }

    fn validate_standalone(block: &Block) -> Result<(), ValidationError> {
        let pow_ok = block.has_valid_pow().map_err(ValidationError::InvalidBits)?;
        if !pow_ok {
            return Err(ValidationError::InvalidProofOfWork);
        }

        if !block.has_valid_merkle_root() {
            return Err(ValidationError::MerkleRootMismatch);
        }

        Ok(())
    }
}
