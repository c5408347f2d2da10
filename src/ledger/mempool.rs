// Pending transaction pool

use crate::core::{Block, Hash256, Transaction};
use std::collections::HashMap;

/// Unconfirmed transactions keyed by txid.
///
/// No validation happens here: every submitted transaction is accepted,
/// and resubmitting the same transaction replaces its entry.
#[derive(Debug, Default, Clone)]
pub struct Mempool {
    transactions: HashMap<Hash256, Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the txid was already pooled
    pub fn insert(&mut self, tx: Transaction) -> bool {
        self.transactions.insert(tx.txid(), tx).is_none()
    }

    /// Drop every transaction confirmed by `block`. Returns how many left.
    pub fn remove_confirmed(&mut self, block: &Block) -> usize {
        let before = self.transactions.len();
        for txid in block.txids() {
            self.transactions.remove(&txid);
        }
        before - self.transactions.len()
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.transactions.contains_key(txid)
    }

    /// Owned copy of the pool, in no particular order
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::EASY_BITS;
    use crate::core::{TxInput, TxOutput};

    fn tx(tag: u8) -> Transaction {
        Transaction::new(
            vec![TxInput::new(Hash256::zero(), tag as u32, vec![tag])],
            vec![TxOutput::new(100, vec![tag])],
        )
    }

    #[test]
    fn test_insert_and_snapshot() {
        let mut pool = Mempool::new();
        pool.insert(tx(1));
        pool.insert(tx(2));

        assert_eq!(pool.len(), 2);
        assert!(pool.contains(&tx(1).txid()));

        let mut ids: Vec<Hash256> = pool.snapshot().iter().map(|t| t.txid()).collect();
        ids.sort();
        let mut expected = vec![tx(1).txid(), tx(2).txid()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_resubmission_keeps_single_entry() {
        let mut pool = Mempool::new();
        assert!(pool.insert(tx(1)));
        assert!(!pool.insert(tx(1)));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_remove_confirmed() {
        let mut pool = Mempool::new();
        pool.insert(tx(1));
        pool.insert(tx(2));

        let block = Block::with_bits(Hash256::zero(), vec![tx(1), tx(3)], EASY_BITS);
        assert_eq!(pool.remove_confirmed(&block), 1);
        assert!(!pool.contains(&tx(1).txid()));
        assert!(pool.contains(&tx(2).txid()));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut pool = Mempool::new();
        pool.insert(tx(1));
        let snapshot = pool.snapshot();

        pool.insert(tx(2));
        assert_eq!(snapshot.len(), 1);
    }
}
