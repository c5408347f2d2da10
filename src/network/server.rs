// RPC server - accepts connections and dispatches requests to the node

use crate::network::{Message, NetworkError, Node};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Shutdown signal sender.
pub type ShutdownTx = broadcast::Sender<()>;

/// Shutdown signal receiver.
pub type ShutdownRx = broadcast::Receiver<()>;

/// Create a shutdown channel.
pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    broadcast::channel(1)
}

pub struct RpcServer {
    node: Arc<Node>,
}

impl RpcServer {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    /// Accept connections until a shutdown signal arrives.
    /// Each connection is served on its own task.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: ShutdownRx,
    ) -> Result<(), NetworkError> {
        log::info!("Node listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = accepted?;
                    log::debug!("New connection from {}", addr);

                    let node = Arc::clone(&self.node);
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(node, stream, addr).await {
                            log::warn!("Connection {} error: {}", addr, e);
                        }
                    });
                }
                _ = shutdown.recv() => {
                    log::info!("Shutting down RPC server");
                    return Ok(());
                }
            }
        }
    }

    /// Request/reply loop for one connection
    async fn handle_connection(
        node: Arc<Node>,
        mut stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), NetworkError> {
        loop {
            let request = match Message::read_from(&mut stream).await {
                Ok(message) => message,
                Err(e) if e.is_disconnect() => {
                    log::debug!("Connection from {} closed", addr);
                    return Ok(());
                }
                Err(e) => {
                    // Tell the caller before dropping the connection
                    let _ = Message::Error(e.to_string()).write_to(&mut stream).await;
                    return Err(e);
                }
            };

            let reply = Self::dispatch(&node, request).await;
            reply.write_to(&mut stream).await?;
        }
    }

    /// Map one request onto the node's operations
    pub async fn dispatch(node: &Node, request: Message) -> Message {
        match request {
            Message::Tx(tx) => Message::Outcome(node.submit_transaction(tx).await),
            Message::Block(block) => Message::Outcome(node.submit_block(block).await),
            Message::GetBlock(hash) => Message::BlockReply(node.get_block(&hash)),
            Message::GetLatest => Message::BlockReply(node.get_latest_block()),
            Message::GetMempool => Message::MempoolReply(node.pending_transactions()),
            other => Message::Error(format!(
                "{} is not a request",
                other.message_type().as_str()
            )),
        }
    }
}
