// Ledger state: the block chain and the pending transaction pool

mod blockchain;
mod mempool;

pub use blockchain::Blockchain;
pub use mempool::Mempool;

use crate::consensus::{PowError, ValidationError};
use thiserror::Error;

/// Failures while bootstrapping a ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("failed to mine genesis block: {0}")]
    Genesis(#[from] PowError),
    #[error("invalid genesis block: {0}")]
    Validation(#[from] ValidationError),
}
