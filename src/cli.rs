// CLI commands

use crate::config::{
    ClientConfig, DEFAULT_BIND, DEFAULT_MINE_TIMEOUT, DEFAULT_PEER_TIMEOUT, DEFAULT_PORT,
    NodeConfig,
};
use crate::consensus::{CancelToken, DEV_BITS, PowError};
use crate::core::{Block, Hash256, Transaction, TxInput, TxOutput};
use crate::ledger::{Blockchain, LedgerError};
use crate::network::{NetworkError, Node, PeerClient, RemotePeer, RpcServer, ShutdownTx, shutdown_channel};
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;

/// Value of the sample transaction's single output: 50 coins
const SAMPLE_OUTPUT_VALUE: u64 = 50 * 100_000_000;

#[derive(Parser)]
#[command(name = "hashchain")]
#[command(about = "Minimal proof-of-work ledger node", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a node
    Node(NodeArgs),

    /// Submit a sample transaction and a freshly mined block to a node
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Peer to replicate to (host:port), may be repeated
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    /// Compact difficulty, hex (0x...) or decimal
    #[arg(long, value_parser = parse_bits, default_value_t = DEV_BITS)]
    pub bits: u32,

    /// Timeout for each peer call in milliseconds
    #[arg(long, default_value_t = DEFAULT_PEER_TIMEOUT.as_millis() as u64)]
    pub peer_timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Node address (host:port)
    #[arg(long, default_value_t = ClientConfig::default().server)]
    pub server: String,

    /// Timeout for each request in milliseconds
    #[arg(long, default_value_t = DEFAULT_PEER_TIMEOUT.as_millis() as u64)]
    pub timeout_ms: u64,

    /// Give up mining after this many seconds
    #[arg(long, default_value_t = DEFAULT_MINE_TIMEOUT.as_secs())]
    pub mine_timeout_secs: u64,
}

impl From<NodeArgs> for NodeConfig {
    fn from(args: NodeArgs) -> Self {
        Self {
            listen_addr: format!("{}:{}", args.bind, args.port),
            peers: args.peers,
            bits: args.bits,
            peer_timeout: Duration::from_millis(args.peer_timeout_ms),
        }
    }
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        Self {
            server: args.server,
            timeout: Duration::from_millis(args.timeout_ms),
            mine_timeout: Duration::from_secs(args.mine_timeout_secs),
        }
    }
}

/// Parse compact bits given as `0x1effffff` or `520093695`
pub fn parse_bits(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid bits '{}': {}", s, e))
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid configuration: {0}")]
    Config(PowError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mining failed: {0}")]
    Mining(PowError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("node returned no latest block")]
    NoLatestBlock,
    #[error("latest block {0} has the largest possible timestamp")]
    NoSuccessor(Hash256),
}

/// Handle CLI command
pub async fn handle(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Node(args) => run_node(args.into()).await,
        Commands::Client(args) => run_client(args.into()).await,
    }
}

/// Mine a genesis block, register peers, and serve until Ctrl+C
pub async fn run_node(config: NodeConfig) -> Result<(), CliError> {
    config.validate().map_err(CliError::Config)?;

    let bits = config.bits;
    log::info!("Mining genesis block at bits {:#010x}", bits);
    let chain = tokio::task::spawn_blocking(move || Blockchain::with_bits(bits)).await??;
    let node = Arc::new(Node::new(chain));

    for addr in &config.peers {
        let peer = RemotePeer::new(addr.clone(), config.peer_timeout);
        node.add_peer(addr.clone(), Arc::new(peer)).await;
    }

    let listener = TcpListener::bind(&config.listen_addr).await?;
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(wait_for_ctrl_c(shutdown_tx));

    RpcServer::new(node).serve(listener, shutdown_rx).await?;
    Ok(())
}

async fn wait_for_ctrl_c(shutdown_tx: ShutdownTx) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            log::info!("Received Ctrl+C, shutting down");
            let _ = shutdown_tx.send(());
        }
        Err(e) => {
            // Keep the sender alive so the server is not shut down by accident
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Broadcast a sample transaction, then mine and broadcast a block holding it
pub async fn run_client(config: ClientConfig) -> Result<(), CliError> {
    let client = RemotePeer::new(config.server.clone(), config.timeout);

    let tx = sample_transaction();
    log::info!("Broadcasting transaction {}", tx.txid());
    let outcome = client.broadcast_transaction(tx.clone()).await?;
    log::info!("Transaction broadcast response: {}", outcome.message);

    let latest = client
        .get_latest_block()
        .await?
        .ok_or(CliError::NoLatestBlock)?;

    let block = Block::successor(&latest, vec![tx], latest.bits())
        .ok_or(CliError::NoSuccessor(latest.hash()))?;
    log::info!("Mining block on top of {}", latest.hash());

    let cancel = CancelToken::with_timeout(config.mine_timeout);
    let (block, result) = tokio::task::spawn_blocking(move || {
        let mut block = block;
        let result = block.mine(&cancel);
        result.map(|r| (block, r))
    })
    .await?
    .map_err(CliError::Mining)?;

    log::info!(
        "Broadcasting block {} (nonce {}, {} attempts)",
        result.hash,
        result.nonce,
        result.attempts
    );
    let outcome = client.broadcast_block(block).await?;
    if outcome.accepted {
        log::info!("Block broadcast response: {}", outcome.message);
    } else {
        log::warn!("Block broadcast response: {}", outcome.message);
    }

    Ok(())
}

/// Transaction spending output 0 of the zero txid. The scripts carry random
/// bytes so repeated runs produce distinct txids.
pub fn sample_transaction() -> Transaction {
    let mut rng = rand::thread_rng();
    let mut script_sig = vec![0u8; 16];
    let mut script_pubkey = vec![0u8; 16];
    rng.fill(&mut script_sig[..]);
    rng.fill(&mut script_pubkey[..]);

    Transaction::new(
        vec![TxInput::new(Hash256::zero(), 0, script_sig)],
        vec![TxOutput::new(SAMPLE_OUTPUT_VALUE, script_pubkey)],
    )
}
