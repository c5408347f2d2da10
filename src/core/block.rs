// Block data structures

use crate::consensus::pow::{CancelToken, DEV_BITS, MiningResult, PowError, Target};
use crate::core::{Hash256, Transaction, block_header_hash, merkle_root};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// How many nonces are tried between two looks at the cancel token
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Current wall-clock time in seconds since the Unix epoch
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block version
    pub version: u32,
    /// Hash of the previous block (zero for genesis)
    pub prev_block_hash: Hash256,
    /// Merkle root of all transactions in the block
    pub merkle_root: Hash256,
    /// Block timestamp (Unix epoch seconds)
    pub timestamp: i64,
    /// Difficulty target (compact format)
    pub bits: u32,
    /// Nonce for proof-of-work
    pub nonce: u64,
}

impl BlockHeader {
    /// Calculate the hash of this block header
    pub fn hash(&self) -> Hash256 {
        block_header_hash(
            &self.prev_block_hash,
            &self.merkle_root,
            self.timestamp,
            self.bits,
            self.nonce,
        )
    }
}

/// Block - header plus transactions, with a lazily cached hash.
///
/// Fields are private so that every mutation of a hashed field goes through
/// a setter that drops the cached hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
    #[serde(skip)]
    hash: OnceLock<Hash256>,
}

impl Block {
    /// Create a block at the development difficulty, timestamped now
    pub fn new(prev_block_hash: Hash256, transactions: Vec<Transaction>) -> Self {
        Self::with_bits(prev_block_hash, transactions, DEV_BITS)
    }

    pub fn with_bits(prev_block_hash: Hash256, transactions: Vec<Transaction>, bits: u32) -> Self {
        let header = BlockHeader {
            version: 1,
            prev_block_hash,
            merkle_root: Self::calculate_merkle_root(&transactions),
            timestamp: current_timestamp(),
            bits,
            nonce: 0,
        };
        Self::from_parts(header, transactions)
    }

    /// Unmined genesis block: zero previous hash, no transactions
    pub fn genesis(bits: u32) -> Self {
        Self::with_bits(Hash256::zero(), Vec::new(), bits)
    }

    /// Candidate block on top of `prev`.
    ///
    /// The timestamp is bumped past the parent's if the clock has not moved
    /// on, so the candidate can satisfy the strictly-increasing rule.
    /// Returns `None` when the parent already carries the largest timestamp.
    pub fn successor(prev: &Block, transactions: Vec<Transaction>, bits: u32) -> Option<Self> {
        let min_timestamp = prev.timestamp().checked_add(1)?;
        let mut block = Self::with_bits(prev.hash(), transactions, bits);
        if block.timestamp() < min_timestamp {
            block.set_timestamp(min_timestamp);
        }
        Some(block)
    }

    /// Assemble a block from an explicit header. The merkle root is taken
    /// as given.
    pub fn from_parts(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
            hash: OnceLock::new(),
        }
    }

    /// Calculate Merkle root from transactions
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Hash256 {
        let txids: Vec<Hash256> = transactions.iter().map(|tx| tx.txid()).collect();
        merkle_root(&txids)
    }

    /// Get the block hash, computing and caching it on first use
    pub fn hash(&self) -> Hash256 {
        *self.hash.get_or_init(|| self.header.hash())
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn txids(&self) -> impl Iterator<Item = Hash256> + '_ {
        self.transactions.iter().map(|tx| tx.txid())
    }

    pub fn prev_block_hash(&self) -> Hash256 {
        self.header.prev_block_hash
    }

    pub fn merkle_root(&self) -> Hash256 {
        self.header.merkle_root
    }

    pub fn timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn bits(&self) -> u32 {
        self.header.bits
    }

    pub fn nonce(&self) -> u64 {
        self.header.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.header.prev_block_hash.is_zero()
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        self.header.nonce = nonce;
        self.invalidate_hash();
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.header.timestamp = timestamp;
        self.invalidate_hash();
    }

    /// Replace the transaction set and recompute the merkle root
    pub fn set_transactions(&mut self, transactions: Vec<Transaction>) {
        self.header.merkle_root = Self::calculate_merkle_root(&transactions);
        self.transactions = transactions;
        self.invalidate_hash();
    }

    fn invalidate_hash(&mut self) {
        self.hash = OnceLock::new();
    }

    /// Whether the stored merkle root commits to the transaction set
    pub fn has_valid_merkle_root(&self) -> bool {
        self.header.merkle_root == Self::calculate_merkle_root(&self.transactions)
    }

    /// Whether the block hash meets its own difficulty target
    pub fn has_valid_pow(&self) -> Result<bool, PowError> {
        let target = Target::from_bits(self.header.bits)?;
        Ok(target.is_met_by(&self.hash()))
    }

    /// Search for a nonce whose header hash meets the target.
    ///
    /// Starts from the current nonce and counts upward. The token is polled
    /// every `CANCEL_CHECK_INTERVAL` attempts; on cancellation the nonce is left where
    /// the search stopped and no hash is cached.
    pub fn mine(&mut self, cancel: &CancelToken) -> Result<MiningResult, PowError> {
        let target = Target::from_bits(self.header.bits)?;
        self.invalidate_hash();

        let start_time = Instant::now();
        let mut attempts = 0u64;

        if cancel.is_cancelled() {
            return Err(PowError::Cancelled { attempts });
        }

        loop {
            let hash = self.header.hash();
            attempts += 1;

            if target.is_met_by(&hash) {
                self.hash = OnceLock::from(hash);
                return Ok(MiningResult {
                    nonce: self.header.nonce,
                    hash,
                    attempts,
                    duration: start_time.elapsed(),
                });
            }

            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                log::debug!("Mining cancelled after {} attempts", attempts);
                return Err(PowError::Cancelled { attempts });
            }

            // Progress indicator every 100k attempts
            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }

            self.header.nonce = self
                .header
                .nonce
                .checked_add(1)
                .ok_or(PowError::NonceSpaceExhausted)?;
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.transactions == other.transactions
    }
}

impl Eq for Block {}
