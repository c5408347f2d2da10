// Node service - guards the ledger and replicates to peers

use crate::consensus::{CancelToken, PowError};
use crate::core::{Block, Hash256, Transaction};
use crate::ledger::Blockchain;
use crate::network::PeerClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// Result of a broadcast request. A rejected block is a normal outcome,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastOutcome {
    pub accepted: bool,
    pub message: String,
}

impl BroadcastOutcome {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("mining failed: {0}")]
    Mining(#[from] PowError),
    #[error("mining task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("no block can extend the current tip")]
    NoTemplate,
}

/// Counts of peer calls issued and failed at the transport level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    pub attempted: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct ReplicationCounters {
    attempted: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone)]
enum Replicated {
    Block(Block),
    Transaction(Transaction),
}

type PeerMap = HashMap<String, Arc<dyn PeerClient>>;

/// Node service.
///
/// The ledger and the peer registry have separate locks and neither is
/// held while the other is taken.
pub struct Node {
    chain: Blockchain,
    /// Registered peers by address
    peers: RwLock<PeerMap>,
    stats: Arc<ReplicationCounters>,
}

impl Node {
    pub fn new(chain: Blockchain) -> Self {
        Self {
            chain,
            peers: RwLock::new(HashMap::new()),
            stats: Arc::new(ReplicationCounters::default()),
        }
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    /// Pool a transaction and relay it to peers.
    ///
    /// A transaction already in the pool is accepted again but not relayed,
    /// so two nodes that list each other as peers do not bounce it forever.
    pub async fn submit_transaction(&self, tx: Transaction) -> BroadcastOutcome {
        let txid = tx.txid();
        if self.chain.submit_transaction(tx.clone()) {
            log::info!("Accepted transaction {}", txid);
            self.replicate(Replicated::Transaction(tx)).await;
        }
        BroadcastOutcome::accepted("Transaction accepted")
    }

    /// Append a block and relay it to peers. Validation failures come back
    /// as a rejected outcome carrying the reason.
    pub async fn submit_block(&self, block: Block) -> BroadcastOutcome {
        let hash = block.hash();
        match self.chain.append_block(block.clone()) {
            Ok(()) => {
                log::info!("Accepted block {}", hash);
                self.replicate(Replicated::Block(block)).await;
                BroadcastOutcome::accepted("Block accepted")
            }
            Err(e) => {
                log::warn!("Rejected block {}: {}", hash, e);
                BroadcastOutcome::rejected(format!("invalid block: {}", e))
            }
        }
    }

    pub fn get_block(&self, hash: &Hash256) -> Option<Block> {
        self.chain.get_block(hash)
    }

    pub fn get_latest_block(&self) -> Option<Block> {
        self.chain.latest_block()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.chain.pending_transactions()
    }

    pub fn block_template(&self, transactions: Vec<Transaction>) -> Option<Block> {
        self.chain.block_template(transactions)
    }

    /// Mine the current mempool into a block and submit it.
    ///
    /// The search runs on a blocking thread with no lock held. If another
    /// block lands first the result is an ordinary rejection.
    pub async fn mine_pending(&self, cancel: CancelToken) -> Result<BroadcastOutcome, NodeError> {
        let mut block = self
            .block_template(self.pending_transactions())
            .ok_or(NodeError::NoTemplate)?;

        let (block, result) = tokio::task::spawn_blocking(move || {
            let result = block.mine(&cancel);
            result.map(|r| (block, r))
        })
        .await??;

        log::info!(
            "Mined block {} in {} attempts ({:.1} H/s)",
            result.hash,
            result.attempts,
            result.hash_rate()
        );
        Ok(self.submit_block(block).await)
    }

    pub async fn add_peer(&self, address: impl Into<String>, handle: Arc<dyn PeerClient>) {
        let address = address.into();
        log::info!("Registered peer {}", address);
        self.peers.write().await.insert(address, handle);
    }

    /// Returns whether the address was registered
    pub async fn remove_peer(&self, address: &str) -> bool {
        let removed = self.peers.write().await.remove(address).is_some();
        if removed {
            log::info!("Removed peer {}", address);
        }
        removed
    }

    pub async fn peer_addresses(&self) -> Vec<String> {
        self.peers.read().await.keys().cloned().collect()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub fn replication_stats(&self) -> ReplicationStats {
        ReplicationStats {
            attempted: self.stats.attempted.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Fire-and-forget fan-out: one task per peer, results discarded.
    async fn replicate(&self, item: Replicated) {
        let peers: Vec<(String, Arc<dyn PeerClient>)> = self
            .peers
            .read()
            .await
            .iter()
            .map(|(addr, peer)| (addr.clone(), Arc::clone(peer)))
            .collect();

        if peers.is_empty() {
            return;
        }
        log::debug!("Replicating to {} peers", peers.len());

        for (addr, peer) in peers {
            let item = item.clone();
            let stats = Arc::clone(&self.stats);
            stats.attempted.fetch_add(1, Ordering::Relaxed);

            tokio::spawn(async move {
                let result = match item {
                    Replicated::Block(block) => peer.broadcast_block(block).await,
                    Replicated::Transaction(tx) => peer.broadcast_transaction(tx).await,
                };

                match result {
                    Ok(outcome) if !outcome.accepted => {
                        log::debug!("Peer {} declined: {}", addr, outcome.message);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        log::debug!("Replication to {} failed: {}", addr, e);
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::EASY_BITS;
    use crate::core::{TxInput, TxOutput};
    use crate::network::{NetworkError, PeerFuture};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Peer double that forwards everything it receives to a channel
    struct RecordingPeer {
        sink: mpsc::UnboundedSender<Replicated>,
    }

    impl RecordingPeer {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Replicated>) {
            let (sink, rx) = mpsc::unbounded_channel();
            (Arc::new(Self { sink }), rx)
        }
    }

    impl PeerClient for RecordingPeer {
        fn broadcast_block(&self, block: Block) -> PeerFuture<'_> {
            let _ = self.sink.send(Replicated::Block(block));
            Box::pin(async { Ok(BroadcastOutcome::accepted("Block accepted")) })
        }

        fn broadcast_transaction(&self, tx: Transaction) -> PeerFuture<'_> {
            let _ = self.sink.send(Replicated::Transaction(tx));
            Box::pin(async { Ok(BroadcastOutcome::accepted("Transaction accepted")) })
        }
    }

    /// Peer double that is never reachable
    struct DeadPeer;

    impl PeerClient for DeadPeer {
        fn broadcast_block(&self, _block: Block) -> PeerFuture<'_> {
            Box::pin(async {
                Err(NetworkError::Timeout {
                    addr: "dead".to_string(),
                })
            })
        }

        fn broadcast_transaction(&self, _tx: Transaction) -> PeerFuture<'_> {
            Box::pin(async {
                Err(NetworkError::Timeout {
                    addr: "dead".to_string(),
                })
            })
        }
    }

    fn easy_node() -> Node {
        Node::new(Blockchain::with_bits(EASY_BITS).unwrap())
    }

    fn tx(tag: u8) -> Transaction {
        Transaction::new(
            vec![TxInput::new(Hash256::zero(), 0, vec![tag])],
            vec![TxOutput::new(50 * 100_000_000, vec![tag])],
        )
    }

    fn mined(mut block: Block) -> Block {
        block.mine(&CancelToken::new()).unwrap();
        block
    }

    async fn next_replicated(rx: &mut mpsc::UnboundedReceiver<Replicated>) -> Replicated {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("replication timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_transaction_accepted_and_replicated() {
        let node = easy_node();
        let (peer, mut rx) = RecordingPeer::new();
        node.add_peer("peer-a", peer).await;

        let outcome = node.submit_transaction(tx(1)).await;
        assert_eq!(outcome, BroadcastOutcome::accepted("Transaction accepted"));
        assert_eq!(node.pending_transactions().len(), 1);

        match next_replicated(&mut rx).await {
            Replicated::Transaction(sent) => assert_eq!(sent.txid(), tx(1).txid()),
            Replicated::Block(_) => panic!("expected a transaction"),
        }
    }

    #[tokio::test]
    async fn test_pooled_transaction_not_relayed_twice() {
        let node = easy_node();
        let (peer, mut rx) = RecordingPeer::new();
        node.add_peer("peer-a", peer).await;

        node.submit_transaction(tx(1)).await;
        next_replicated(&mut rx).await;

        let outcome = node.submit_transaction(tx(1)).await;
        assert!(outcome.accepted);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(node.replication_stats().attempted, 1);
    }

    #[tokio::test]
    async fn test_rejected_block_is_normal_outcome() {
        let node = easy_node();
        let (peer, mut rx) = RecordingPeer::new();
        node.add_peer("peer-a", peer).await;

        let stray = mined(Block::with_bits(Hash256::new([5; 32]), vec![], EASY_BITS));
        let outcome = node.submit_block(stray).await;

        assert!(!outcome.accepted);
        assert!(outcome.message.starts_with("invalid block: previous block hash mismatch"));
        assert_eq!(node.chain().len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_accepted_block_replicated_to_every_peer() {
        let node = easy_node();
        let (peer_a, mut rx_a) = RecordingPeer::new();
        let (peer_b, mut rx_b) = RecordingPeer::new();
        node.add_peer("peer-a", peer_a).await;
        node.add_peer("peer-b", peer_b).await;

        let block = mined(node.block_template(vec![tx(1)]).unwrap());
        let outcome = node.submit_block(block.clone()).await;
        assert_eq!(outcome, BroadcastOutcome::accepted("Block accepted"));

        for rx in [&mut rx_a, &mut rx_b] {
            match next_replicated(rx).await {
                Replicated::Block(sent) => assert_eq!(sent, block),
                Replicated::Transaction(_) => panic!("expected a block"),
            }
        }
    }

    #[tokio::test]
    async fn test_dead_peer_does_not_affect_outcome() {
        let node = easy_node();
        node.add_peer("dead", Arc::new(DeadPeer)).await;

        let outcome = node.submit_transaction(tx(1)).await;
        assert!(outcome.accepted);

        let block = mined(node.block_template(vec![tx(1)]).unwrap());
        assert!(node.submit_block(block).await.accepted);
        assert!(node.pending_transactions().is_empty());

        let mut stats = node.replication_stats();
        for _ in 0..100 {
            if stats.failed == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            stats = node.replication_stats();
        }
        assert_eq!(stats, ReplicationStats { attempted: 2, failed: 2 });
    }

    #[tokio::test]
    async fn test_peer_registry() {
        let node = easy_node();
        let (peer, _rx) = RecordingPeer::new();

        node.add_peer("10.0.0.1:50051", peer.clone()).await;
        node.add_peer("10.0.0.2:50051", peer).await;
        assert_eq!(node.peer_count().await, 2);

        assert!(node.remove_peer("10.0.0.1:50051").await);
        assert!(!node.remove_peer("10.0.0.1:50051").await);
        assert_eq!(node.peer_addresses().await, vec!["10.0.0.2:50051".to_string()]);
    }

    #[tokio::test]
    async fn test_removed_peer_gets_nothing() {
        let node = easy_node();
        let (peer, mut rx) = RecordingPeer::new();
        node.add_peer("peer-a", peer).await;
        node.remove_peer("peer-a").await;

        node.submit_transaction(tx(1)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mine_pending_confirms_mempool() {
        let node = easy_node();
        node.submit_transaction(tx(1)).await;
        node.submit_transaction(tx(2)).await;

        let outcome = node.mine_pending(CancelToken::new()).await.unwrap();
        assert!(outcome.accepted);
        assert_eq!(node.chain().len(), 2);
        assert!(node.pending_transactions().is_empty());
        assert_eq!(node.get_latest_block().unwrap().transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_resubmitted_confirmed_tx_is_not_mined_again() {
        let node = easy_node();
        let (peer, mut rx) = RecordingPeer::new();
        node.submit_transaction(tx(1)).await;
        node.mine_pending(CancelToken::new()).await.unwrap();
        node.add_peer("peer", peer).await;

        let outcome = node.submit_transaction(tx(1)).await;
        assert!(outcome.accepted);
        assert!(node.pending_transactions().is_empty());

        let outcome = node.mine_pending(CancelToken::new()).await.unwrap();
        assert!(outcome.accepted);
        assert!(node.get_latest_block().unwrap().transactions().is_empty());

        // Only the empty block was relayed, never the confirmed tx
        match rx.recv().await {
            Some(Replicated::Block(block)) => assert!(block.transactions().is_empty()),
            _ => panic!("expected a replicated block"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mine_pending_after_max_timestamp_tip() {
        let node = easy_node();
        let mut hostile = node.block_template(vec![]).unwrap();
        hostile.set_timestamp(i64::MAX);
        assert!(node.submit_block(mined(hostile)).await.accepted);

        assert!(node.block_template(vec![]).is_none());
        assert!(matches!(
            node.mine_pending(CancelToken::new()).await,
            Err(NodeError::NoTemplate)
        ));
        assert_eq!(node.chain().len(), 2);
    }

    #[tokio::test]
    async fn test_mine_pending_honours_cancel() {
        let node = easy_node();
        let token = CancelToken::new();
        token.cancel();

        match node.mine_pending(token).await {
            Err(NodeError::Mining(PowError::Cancelled { .. })) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(node.chain().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_block_submissions_accept_one() {
        let node = Arc::new(easy_node());
        let candidates: Vec<Block> = (0..8)
            .map(|i| mined(node.block_template(vec![tx(i)]).unwrap()))
            .collect();

        let handles: Vec<_> = candidates
            .into_iter()
            .map(|block| {
                let node = Arc::clone(&node);
                tokio::spawn(async move { node.submit_block(block).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().accepted {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(node.chain().len(), 2);
    }

    #[tokio::test]
    async fn test_end_to_end_at_dev_difficulty() {
        let node = Node::new(Blockchain::new().unwrap());
        assert_eq!(node.chain().len(), 1);
        let genesis = node.get_latest_block().unwrap();
        assert_eq!(&genesis.hash().as_bytes()[..2], &[0, 0]);

        let sample = tx(1);
        assert!(node.submit_transaction(sample.clone()).await.accepted);

        let mut block = node.block_template(vec![sample]).unwrap();
        let cancel = CancelToken::with_timeout(Duration::from_secs(120));
        block = tokio::task::spawn_blocking(move || {
            block.mine(&cancel).unwrap();
            block
        })
        .await
        .unwrap();

        let outcome = node.submit_block(block.clone()).await;
        assert!(outcome.accepted, "{}", outcome.message);
        assert_eq!(node.chain().len(), 2);
        assert!(node.pending_transactions().is_empty());
        assert_eq!(node.get_latest_block(), Some(block.clone()));
        assert_eq!(node.get_block(&block.hash()), Some(block.clone()));

        // Same block again: its parent is no longer the tip
        let again = node.submit_block(block).await;
        assert!(!again.accepted);
        assert!(again.message.contains("previous block hash mismatch"));
        assert_eq!(node.chain().len(), 2);
    }
}
