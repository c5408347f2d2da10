// Transaction data structures

use crate::core::{Hash256, Serializable, hash256};
use serde::{Deserialize, Serialize};
use super::serialize::{write_var_bytes, write_varint};

/// Transaction input - references a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Id of the previous transaction
    pub prev_txid: Hash256,
    /// Index of the output in the previous transaction
    pub prev_index: u32,
    /// Unlocking script (opaque to the ledger)
    pub script_sig: Vec<u8>,
    /// Sequence number
    pub sequence: u32,
}

impl TxInput {
    /// Create a new transaction input with the final sequence number
    pub fn new(prev_txid: Hash256, prev_index: u32, script_sig: Vec<u8>) -> Self {
        Self {
            prev_txid,
            prev_index,
            script_sig,
            sequence: 0xffffffff,
        }
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.prev_txid.as_bytes());
        buf.extend_from_slice(&self.prev_index.to_le_bytes());
        write_var_bytes(buf, &self.script_sig);
        buf.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    /// Locking script (opaque to the ledger)
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_var_bytes(buf, &self.script_pubkey);
    }
}

/// Wire form of a transaction. The id is never sent; it is re-derived on
/// receipt so a peer cannot hand us a transaction under a foreign id.
#[derive(Serialize, Deserialize)]
struct TransactionBody {
    version: u32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u32,
}

/// Transaction
///
/// Immutable once built: the id is computed at construction from the
/// serialized content and the fields are only reachable through getters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TransactionBody", into = "TransactionBody")]
pub struct Transaction {
    version: u32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u32,
    txid: Hash256,
}

impl Transaction {
    /// Create a version 1 transaction with no lock time
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self::with_params(1, inputs, outputs, 0)
    }

    pub fn with_params(
        version: u32,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        lock_time: u32,
    ) -> Self {
        let mut tx = Self {
            version,
            inputs,
            outputs,
            lock_time,
            txid: Hash256::zero(),
        };
        tx.txid = hash256(&Serializable::serialize(&tx));
        tx
    }

    /// Transaction id (double SHA256 of the serialized transaction)
    pub fn txid(&self) -> Hash256 {
        self.txid
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|out| out.value).sum()
    }
}

impl Serializable for Transaction {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&self.version.to_le_bytes());

        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write_to(&mut buf);
        }

        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write_to(&mut buf);
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());

        buf
    }
}

impl From<TransactionBody> for Transaction {
    fn from(body: TransactionBody) -> Self {
        Self::with_params(body.version, body.inputs, body.outputs, body.lock_time)
    }
}

impl From<Transaction> for TransactionBody {
    fn from(tx: Transaction) -> Self {
        Self {
            version: tx.version,
            inputs: tx.inputs,
            outputs: tx.outputs,
            lock_time: tx.lock_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(script: &[u8]) -> Transaction {
        Transaction::new(
            vec![TxInput::new(Hash256::zero(), 0, script.to_vec())],
            vec![TxOutput::new(5_000_000_000, b"pubkey".to_vec())],
        )
    }

    #[test]
    fn test_txid_is_stable() {
        let tx = sample_tx(b"sig");
        assert_eq!(tx.txid(), tx.clone().txid());
        assert_eq!(tx.txid(), hash256(&Serializable::serialize(&tx)));
    }

    #[test]
    fn test_txid_depends_on_content() {
        assert_ne!(sample_tx(b"sig-a").txid(), sample_tx(b"sig-b").txid());

        let base = sample_tx(b"sig");
        let locked = Transaction::with_params(
            1,
            base.inputs().to_vec(),
            base.outputs().to_vec(),
            500,
        );
        assert_ne!(base.txid(), locked.txid());
    }

    #[test]
    fn test_json_rederives_txid() {
        let tx = sample_tx(b"sig");
        let json = serde_json::to_string(&tx).unwrap();
        assert!(!json.contains("\"txid\""));

        let decoded: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.txid(), tx.txid());
    }

    #[test]
    fn test_new_input_uses_final_sequence() {
        let input = TxInput::new(Hash256::zero(), 3, vec![]);
        assert_eq!(input.sequence, 0xffffffff);
        assert_eq!(input.prev_index, 3);
    }

    #[test]
    fn test_total_output_value() {
        let tx = Transaction::new(
            vec![],
            vec![TxOutput::new(10, vec![]), TxOutput::new(32, vec![])],
        );
        assert_eq!(tx.total_output_value(), 42);
    }
}
