// Node and client configuration

use crate::consensus::{DEV_BITS, PowError, Target};
use std::time::Duration;

/// Default RPC port
pub const DEFAULT_PORT: u16 = 50051;

/// Default bind address for the node listener
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default timeout for a single peer call
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default time the sample client spends mining before giving up
pub const DEFAULT_MINE_TIMEOUT: Duration = Duration::from_secs(60);

/// Node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Address the RPC server binds to (`host:port`).
    pub listen_addr: String,

    /// Peer addresses to replicate to.
    pub peers: Vec<String>,

    /// Compact difficulty for the genesis block and block templates.
    pub bits: u32,

    /// Bound on each outgoing peer call.
    pub peer_timeout: Duration,
}

impl NodeConfig {
    /// Reject a difficulty that cannot be decoded
    pub fn validate(&self) -> Result<(), PowError> {
        Target::from_bits(self.bits).map(|_| ())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("{}:{}", DEFAULT_BIND, DEFAULT_PORT),
            peers: Vec::new(),
            bits: DEV_BITS,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
        }
    }
}

/// Sample client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Node to talk to.
    pub server: String,

    /// Bound on each request.
    pub timeout: Duration,

    /// Mining is cancelled after this long.
    pub mine_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", DEFAULT_PORT),
            timeout: DEFAULT_PEER_TIMEOUT,
            mine_timeout: DEFAULT_MINE_TIMEOUT,
        }
    }
}
