// Minimal proof-of-work ledger node

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod ledger;
pub mod network;

// Re-exports for convenience
pub use config::{ClientConfig, NodeConfig};
pub use consensus::{BlockValidator, CancelToken, PowError, Target, ValidationError};
pub use core::{Block, BlockHeader, Hash256, Transaction, TxInput, TxOutput};
pub use ledger::{Blockchain, LedgerError, Mempool};
pub use network::{BroadcastOutcome, Message, Node, PeerClient, RemotePeer, RpcServer};
