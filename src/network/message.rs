// Wire messages exchanged between nodes and clients
//
// Frame layout: 12-byte command name (zero padded), 4-byte little-endian
// payload length, JSON payload.

use crate::core::{Block, Hash256, Transaction};
use crate::network::{BroadcastOutcome, NetworkError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const COMMAND_LEN: usize = 12;
const HEADER_LEN: usize = COMMAND_LEN + 4;

/// Largest payload a peer may send
pub const MAX_PAYLOAD_LEN: usize = 32 * 1024 * 1024;

/// Network message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Tx,
    Block,
    GetBlock,
    GetLatest,
    GetMempool,
    Outcome,
    BlockReply,
    MempoolReply,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Tx => "tx",
            MessageType::Block => "block",
            MessageType::GetBlock => "getblock",
            MessageType::GetLatest => "getlatest",
            MessageType::GetMempool => "getmempool",
            MessageType::Outcome => "outcome",
            MessageType::BlockReply => "blockreply",
            MessageType::MempoolReply => "mempoolreply",
            MessageType::Error => "error",
        }
    }

    pub fn from_command(s: &str) -> Option<Self> {
        match s {
            "tx" => Some(MessageType::Tx),
            "block" => Some(MessageType::Block),
            "getblock" => Some(MessageType::GetBlock),
            "getlatest" => Some(MessageType::GetLatest),
            "getmempool" => Some(MessageType::GetMempool),
            "outcome" => Some(MessageType::Outcome),
            "blockreply" => Some(MessageType::BlockReply),
            "mempoolreply" => Some(MessageType::MempoolReply),
            "error" => Some(MessageType::Error),
            _ => None,
        }
    }
}

/// Network message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Broadcast a transaction
    Tx(Transaction),
    /// Broadcast a block
    Block(Block),
    GetBlock(Hash256),
    GetLatest,
    GetMempool,
    /// Reply to `Tx` / `Block`
    Outcome(BroadcastOutcome),
    /// Reply to `GetBlock` / `GetLatest`
    BlockReply(Option<Block>),
    /// Reply to `GetMempool`
    MempoolReply(Vec<Transaction>),
    /// Reply to anything the server could not handle
    Error(String),
}

impl Message {
    /// Get message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Tx(_) => MessageType::Tx,
            Message::Block(_) => MessageType::Block,
            Message::GetBlock(_) => MessageType::GetBlock,
            Message::GetLatest => MessageType::GetLatest,
            Message::GetMempool => MessageType::GetMempool,
            Message::Outcome(_) => MessageType::Outcome,
            Message::BlockReply(_) => MessageType::BlockReply,
            Message::MempoolReply(_) => MessageType::MempoolReply,
            Message::Error(_) => MessageType::Error,
        }
    }

    /// Serialize message to a complete frame
    pub fn serialize(&self) -> Result<Vec<u8>, NetworkError> {
        let payload = self.serialize_payload()?;
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(NetworkError::Malformed(format!(
                "payload of {} bytes exceeds limit",
                payload.len()
            )));
        }

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());

        let mut command = [0u8; COMMAND_LEN];
        let name = self.message_type().as_str().as_bytes();
        command[..name.len()].copy_from_slice(name);
        bytes.extend_from_slice(&command);

        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);

        Ok(bytes)
    }

    fn serialize_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Message::Tx(tx) => serde_json::to_vec(tx),
            Message::Block(block) => serde_json::to_vec(block),
            Message::GetBlock(hash) => serde_json::to_vec(hash),
            Message::GetLatest | Message::GetMempool => Ok(Vec::new()),
            Message::Outcome(outcome) => serde_json::to_vec(outcome),
            Message::BlockReply(block) => serde_json::to_vec(block),
            Message::MempoolReply(txs) => serde_json::to_vec(txs),
            Message::Error(reason) => serde_json::to_vec(reason),
        }
    }

    /// Deserialize a complete frame
    pub fn deserialize(data: &[u8]) -> Result<Self, NetworkError> {
        if data.len() < HEADER_LEN {
            return Err(NetworkError::Malformed("message too short".to_string()));
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&data[..HEADER_LEN]);
        let (msg_type, payload_len) = Self::parse_header(&header)?;

        let payload = data
            .get(HEADER_LEN..HEADER_LEN + payload_len)
            .ok_or_else(|| NetworkError::Malformed("incomplete payload".to_string()))?;

        Self::deserialize_payload(msg_type, payload)
    }

    fn parse_header(header: &[u8; HEADER_LEN]) -> Result<(MessageType, usize), NetworkError> {
        let command = std::str::from_utf8(&header[..COMMAND_LEN])
            .map_err(|e| NetworkError::Malformed(format!("invalid command: {}", e)))?
            .trim_end_matches('\0');

        let msg_type = MessageType::from_command(command)
            .ok_or_else(|| NetworkError::Malformed(format!("unknown command: {}", command)))?;

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[COMMAND_LEN..]);
        let payload_len = u32::from_le_bytes(len_bytes) as usize;

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(NetworkError::Malformed(format!(
                "payload of {} bytes exceeds limit",
                payload_len
            )));
        }

        Ok((msg_type, payload_len))
    }

    fn deserialize_payload(msg_type: MessageType, payload: &[u8]) -> Result<Self, NetworkError> {
        let message = match msg_type {
            MessageType::Tx => Message::Tx(serde_json::from_slice(payload)?),
            MessageType::Block => Message::Block(serde_json::from_slice(payload)?),
            MessageType::GetBlock => Message::GetBlock(serde_json::from_slice(payload)?),
            MessageType::GetLatest => Message::GetLatest,
            MessageType::GetMempool => Message::GetMempool,
            MessageType::Outcome => Message::Outcome(serde_json::from_slice(payload)?),
            MessageType::BlockReply => Message::BlockReply(serde_json::from_slice(payload)?),
            MessageType::MempoolReply => Message::MempoolReply(serde_json::from_slice(payload)?),
            MessageType::Error => Message::Error(serde_json::from_slice(payload)?),
        };
        Ok(message)
    }

    /// Read one frame from a stream
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, NetworkError> {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header).await?;
        let (msg_type, payload_len) = Self::parse_header(&header)?;

        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 {
            reader.read_exact(&mut payload).await?;
        }

        Self::deserialize_payload(msg_type, &payload)
    }

    /// Write one frame to a stream and flush it
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), NetworkError> {
        let data = self.serialize()?;
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }
}
