use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Previous hash recorded by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Represents a block in the ledger
///
/// Fields are only readable from outside the crate, so a block handed out
/// by the ledger cannot be altered through the public API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    timestamp: DateTime<Utc>,

    /// Ownership transfers sealed in this block, in submission order
    #[schema(value_type = Vec<Object>)]
    pub(crate) transactions: Vec<Transaction>,

    /// Hash of the previous block
    previous_hash: String,

    /// Proof of work nonce
    pub(crate) nonce: u64,

    /// Hash of this block, empty until sealed
    pub(crate) hash: String,
}

impl Block {
    /// Creates an unsealed candidate block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `transactions` - The transactions to include in the block
    /// * `previous_hash` - The hash of the previous block
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        Block {
            index,
            timestamp: Utc::now(),
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        }
    }

    /// Creates the genesis block
    ///
    /// The genesis block carries a single placeholder transaction and is
    /// hashed without proof of work.
    pub fn genesis() -> Self {
        let mut block = Block::new(
            0,
            vec![Transaction::genesis()],
            GENESIS_PREVIOUS_HASH.to_string(),
        );
        block.hash = block.compute_hash();
        block
    }

    /// Computes the SHA-256 content hash of the block
    ///
    /// The preimage is the JSON rendering of every field except `hash`.
    /// Object keys come out in sorted order, and the transaction list keeps
    /// its order, so reordering transactions changes the hash.
    ///
    /// # Returns
    ///
    /// The hash as a lowercase hexadecimal string
    pub fn compute_hash(&self) -> String {
        let preimage = serde_json::json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
        });

        let mut hasher = Sha256::new();
        hasher.update(preimage.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Checks whether the stored hash still matches the block contents
    pub fn has_valid_hash(&self) -> bool {
        !self.hash.is_empty() && self.hash == self.compute_hash()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Checks if a hash starts with `difficulty` zero characters
pub fn meets_difficulty(hash: &str, difficulty: u8) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}
