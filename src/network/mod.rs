// Node service and TCP transport

mod error;
mod message;
mod node;
mod peer;
mod server;

pub use error::NetworkError;
pub use message::{MAX_PAYLOAD_LEN, Message, MessageType};
pub use node::{BroadcastOutcome, Node, NodeError, ReplicationStats};
pub use peer::{PeerClient, PeerFuture, RemotePeer};
pub use server::{RpcServer, ShutdownRx, ShutdownTx, shutdown_channel};
