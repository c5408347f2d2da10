// Peer handles

use crate::core::{Block, Hash256, Transaction};
use crate::network::{BroadcastOutcome, Message, NetworkError};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

pub type PeerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BroadcastOutcome, NetworkError>> + Send + 'a>>;

/// Remote-call capability the node uses to replicate to a peer
pub trait PeerClient: Send + Sync {
    fn broadcast_block(&self, block: Block) -> PeerFuture<'_>;
    fn broadcast_transaction(&self, tx: Transaction) -> PeerFuture<'_>;
}

/// Peer reached over TCP. Each call opens a fresh connection; every step
/// (connect, send, receive) is bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct RemotePeer {
    addr: String,
    timeout: Duration,
}

impl RemotePeer {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request and wait for its reply
    pub async fn request(&self, message: &Message) -> Result<Message, NetworkError> {
        let mut stream = self
            .bounded(TcpStream::connect(self.addr.as_str()))
            .await??;

        self.bounded(message.write_to(&mut stream)).await??;
        let reply = self.bounded(Message::read_from(&mut stream)).await??;

        match reply {
            Message::Error(reason) => Err(NetworkError::Remote(reason)),
            reply => Ok(reply),
        }
    }

    async fn bounded<F: Future>(&self, fut: F) -> Result<F::Output, NetworkError> {
        timeout(self.timeout, fut)
            .await
            .map_err(|_| NetworkError::Timeout {
                addr: self.addr.clone(),
            })
    }

    async fn broadcast(&self, message: Message) -> Result<BroadcastOutcome, NetworkError> {
        match self.request(&message).await? {
            Message::Outcome(outcome) => Ok(outcome),
            other => Err(NetworkError::UnexpectedReply(
                other.message_type().as_str().to_string(),
            )),
        }
    }

    pub async fn get_block(&self, hash: Hash256) -> Result<Option<Block>, NetworkError> {
        self.block_request(Message::GetBlock(hash)).await
    }

    pub async fn get_latest_block(&self) -> Result<Option<Block>, NetworkError> {
        self.block_request(Message::GetLatest).await
    }

    pub async fn pending_transactions(&self) -> Result<Vec<Transaction>, NetworkError> {
        match self.request(&Message::GetMempool).await? {
            Message::MempoolReply(txs) => Ok(txs),
            other => Err(NetworkError::UnexpectedReply(
                other.message_type().as_str().to_string(),
            )),
        }
    }

    async fn block_request(&self, message: Message) -> Result<Option<Block>, NetworkError> {
        match self.request(&message).await? {
            Message::BlockReply(block) => Ok(block),
            other => Err(NetworkError::UnexpectedReply(
                other.message_type().as_str().to_string(),
            )),
        }
    }
}

impl PeerClient for RemotePeer {
    fn broadcast_block(&self, block: Block) -> PeerFuture<'_> {
        Box::pin(self.broadcast(Message::Block(block)))
    }

    fn broadcast_transaction(&self, tx: Transaction) -> PeerFuture<'_> {
        Box::pin(self.broadcast(Message::Tx(tx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_remote_peer_addr() {
        let peer = RemotePeer::new("127.0.0.1:50051", Duration::from_secs(1));
        assert_eq!(peer.addr(), "127.0.0.1:50051");
    }

    #[tokio::test]
    async fn test_unreachable_peer_errors() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let peer = RemotePeer::new(addr.to_string(), Duration::from_secs(2));
        let result = peer.broadcast_transaction(Transaction::new(vec![], vec![])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept but never answer
        let holder = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let peer = RemotePeer::new(addr.to_string(), Duration::from_millis(100));
        let result = peer.get_latest_block().await;
        assert!(matches!(result, Err(NetworkError::Timeout { .. })));

        holder.abort();
    }

    #[tokio::test]
    async fn test_error_reply_surfaces_as_remote() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = Message::read_from(&mut stream).await;
            Message::Error("nope".to_string())
                .write_to(&mut stream)
                .await
                .unwrap();
        });

        let peer = RemotePeer::new(addr.to_string(), Duration::from_secs(2));
        match peer.pending_transactions().await {
            Err(NetworkError::Remote(reason)) => assert_eq!(reason, "nope"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
