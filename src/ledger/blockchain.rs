// In-memory block chain with its mempool

use crate::consensus::{BlockValidator, CancelToken, DEV_BITS, ValidationError};
use crate::core::{Block, Hash256, Transaction};
use crate::ledger::{LedgerError, Mempool};
use parking_lot::RwLock;
use std::collections::HashSet;

/// Blocks and mempool form one unit guarded by one lock
#[derive(Debug)]
struct ChainState {
    blocks: Vec<Block>,
    mempool: Mempool,
    /// Txids of every transaction in `blocks`
    confirmed: HashSet<Hash256>,
}

/// Append-only chain of blocks plus pending transactions.
///
/// Reads take the shared lock, `append_block` and `submit_transaction` the
/// exclusive one. Nothing slow (mining, network) ever runs under the lock.
#[derive(Debug)]
pub struct Blockchain {
    state: RwLock<ChainState>,
    /// Difficulty used for blocks this node builds
    bits: u32,
}

impl Blockchain {
    /// Chain at the development difficulty with a freshly mined genesis
    pub fn new() -> Result<Self, LedgerError> {
        Self::with_bits(DEV_BITS)
    }

    pub fn with_bits(bits: u32) -> Result<Self, LedgerError> {
        let mut genesis = Block::genesis(bits);
        let result = genesis.mine(&CancelToken::new())?;
        log::info!(
            "Mined genesis block {} in {} attempts",
            result.hash,
            result.attempts
        );
        Self::from_genesis(genesis)
    }

    /// Start a chain from an already mined genesis block
    pub fn from_genesis(genesis: Block) -> Result<Self, LedgerError> {
        let chain = Self {
            state: RwLock::new(ChainState {
                blocks: Vec::new(),
                mempool: Mempool::new(),
                confirmed: HashSet::new(),
            }),
            bits: genesis.bits(),
        };
        chain.append_block(genesis)?;
        Ok(chain)
    }

    /// Validate `candidate` against the tip and append it.
    ///
    /// On success every mempool transaction confirmed by the block is
    /// dropped. On failure nothing changes. An empty chain accepts any block
    /// whose own proof of work holds.
    pub fn append_block(&self, candidate: Block) -> Result<(), ValidationError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        match state.blocks.last() {
            Some(tip) => BlockValidator::validate_next(tip, &candidate)?,
            None => BlockValidator::validate_genesis(&candidate)?,
        }

        let confirmed = state.mempool.remove_confirmed(&candidate);
        state.confirmed.extend(candidate.txids());
        log::info!(
            "Appended block {} at height {} ({} txs, {} left mempool)",
            candidate.hash(),
            state.blocks.len(),
            candidate.transactions().len(),
            confirmed
        );
        state.blocks.push(candidate);

        Ok(())
    }

    /// Add a transaction to the mempool. Always succeeds; the return value
    /// tells whether the txid was new to the pool.
    ///
    /// A transaction already confirmed by an appended block is not pooled
    /// again.
    pub fn submit_transaction(&self, tx: Transaction) -> bool {
        let txid = tx.txid();
        let mut state = self.state.write();
        if state.confirmed.contains(&txid) {
            log::debug!("Transaction {} already confirmed, not pooled", txid);
            return false;
        }
        let added = state.mempool.insert(tx);
        log::debug!("Added transaction {} to mempool (new: {})", txid, added);
        added
    }

    pub fn latest_block(&self) -> Option<Block> {
        self.state.read().blocks.last().cloned()
    }

    /// Linear scan by block hash
    pub fn get_block(&self, hash: &Hash256) -> Option<Block> {
        self.state
            .read()
            .blocks
            .iter()
            .find(|block| block.hash() == *hash)
            .cloned()
    }

    /// Owned copy of the mempool
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.read().mempool.snapshot()
    }

    /// Unmined candidate on top of the current tip. `None` when there is no
    /// tip or the tip's timestamp cannot be exceeded.
    pub fn block_template(&self, transactions: Vec<Transaction>) -> Option<Block> {
        let tip = self.latest_block()?;
        Block::successor(&tip, transactions, self.bits)
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().blocks.is_empty()
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }
}
