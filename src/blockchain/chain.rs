use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::{meets_difficulty, Block};
use super::transaction::{Transaction, ValidationError};

/// Mining difficulty used when none is configured
pub const DEFAULT_DIFFICULTY: u8 = 4;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No transactions to mine")]
    EmptyBuffer,

    #[error("Chain changed while mining: expected previous hash {expected}, found {found}")]
    AppendConflict { expected: String, found: String },

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

impl LedgerError {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "ValidationError",
            LedgerError::EmptyBuffer => "EmptyBufferError",
            LedgerError::AppendConflict { .. } => "AppendConflictError",
            LedgerError::InvalidBlock(_) => "InvalidBlockError",
            LedgerError::InvalidChain(_) => "InvalidChainError",
        }
    }
}

/// One appearance of a vehicle in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    /// Index of the block holding the transaction
    pub index: u64,

    /// Timestamp of the block holding the transaction
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// The matching transaction
    #[schema(value_type = Object)]
    pub transaction: Transaction,
}

/// The vehicle ownership ledger
///
/// Readers take snapshots under the chain read lock. Mining is serialized by
/// `mining`, which is held for the whole mine operation while the chain lock
/// is only taken to read the tip and to append.
#[derive(Debug)]
pub struct Ledger {
    /// The chain of sealed blocks
    chain: RwLock<Vec<Block>>,

    /// Transactions waiting for the next block
    pending_transactions: Mutex<Vec<Transaction>>,

    /// Serializes mine operations
    mining: Mutex<()>,

    /// Number of leading zeros required in a block hash
    difficulty: u8,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Creates a new ledger with the default difficulty
    pub fn new() -> Self {
        Self::with_difficulty(DEFAULT_DIFFICULTY)
    }

    /// Creates a new ledger holding only the genesis block
    pub fn with_difficulty(difficulty: u8) -> Self {
        let genesis = Block::genesis();
        info!("Created genesis block {}", genesis.hash());

        Ledger {
            chain: RwLock::new(vec![genesis]),
            pending_transactions: Mutex::new(Vec::new()),
            mining: Mutex::new(()),
            difficulty,
        }
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// Number of blocks in the chain
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    /// Gets the last block in the chain
    pub fn get_last_block(&self) -> Block {
        let chain = self.chain.read();
        // the chain always holds at least the genesis block
        chain[chain.len() - 1].clone()
    }

    /// Validates a raw JSON transaction and queues it for the next block
    ///
    /// # Returns
    ///
    /// The index of the block the transaction is expected to land in. This
    /// is advisory: a concurrent mine may seal it into a later block.
    pub fn add_new_transaction(&self, payload: serde_json::Value) -> Result<u64, LedgerError> {
        let transaction = Transaction::from_json(payload)?;
        self.add_transaction(transaction)
    }

    /// Queues an already typed transaction for the next block
    pub fn add_transaction(&self, transaction: Transaction) -> Result<u64, LedgerError> {
        transaction.validate()?;

        info!(
            "Queued {} of vehicle {} from {} to {}",
            transaction.transaction_type,
            transaction.vehicle_id,
            transaction.previous_owner,
            transaction.new_owner
        );
        self.pending_transactions.lock().push(transaction);

        Ok(self.get_last_block().index() + 1)
    }

    /// Gets a snapshot of the transactions waiting to be mined
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.pending_transactions.lock().clone()
    }

    /// Mines a new block from the pending transactions
    ///
    /// # Returns
    ///
    /// A copy of the sealed block that was appended to the chain
    pub fn mine(&self) -> Result<Block, LedgerError> {
        let _mining = self.mining.lock();

        let transactions = self.pending_transactions.lock().clone();
        if transactions.is_empty() {
            return Err(LedgerError::EmptyBuffer);
        }

        let last_block = self.get_last_block();
        let candidate = Block::new(
            last_block.index() + 1,
            transactions,
            last_block.hash().to_string(),
        );

        info!(
            "Mining block {} with {} transactions at difficulty {}",
            candidate.index(),
            candidate.transactions().len(),
            self.difficulty
        );
        let started = Instant::now();
        let block = self.proof_of_work(candidate);
        info!(
            "Mined block {} with nonce {} in {:?}",
            block.index(),
            block.nonce(),
            started.elapsed()
        );

        self.append_block(block.clone())?;

        // Only drop what was sealed; anything queued during the search stays.
        let included = block.transactions().len();
        let mut pending = self.pending_transactions.lock();
        let included = included.min(pending.len());
        pending.drain(..included);

        Ok(block)
    }

    /// Searches for a nonce that satisfies the difficulty and seals the block
    ///
    /// The search starts at nonce 0 and runs until a hash with enough
    /// leading zeros is found. It is not bounded.
    pub fn proof_of_work(&self, mut block: Block) -> Block {
        block.nonce = 0;

        loop {
            let hash = block.compute_hash();

            if meets_difficulty(&hash, self.difficulty) {
                block.hash = hash;
                return block;
            }

            block.nonce += 1;
        }
    }

    /// Appends a sealed block to the chain
    ///
    /// The block must extend the current tip and carry a hash that matches
    /// its contents and satisfies the difficulty. The chain is left untouched
    /// on any failure.
    pub fn append_block(&self, block: Block) -> Result<(), LedgerError> {
        if !block.has_valid_hash() {
            return Err(LedgerError::InvalidBlock(format!(
                "block {} hash does not match its contents",
                block.index()
            )));
        }

        if !meets_difficulty(block.hash(), self.difficulty) {
            return Err(LedgerError::InvalidBlock(format!(
                "block {} hash {} does not meet difficulty {}",
                block.index(),
                block.hash(),
                self.difficulty
            )));
        }

        let mut chain = self.chain.write();
        let last_block = &chain[chain.len() - 1];

        if block.previous_hash() != last_block.hash() || block.index() != last_block.index() + 1 {
            warn!(
                "Rejected block {}: chain tip is now block {}",
                block.index(),
                last_block.index()
            );
            return Err(LedgerError::AppendConflict {
                expected: last_block.hash().to_string(),
                found: block.previous_hash().to_string(),
            });
        }

        debug!("Appending block {} ({})", block.index(), block.hash());
        chain.push(block);

        Ok(())
    }

    /// Gets a snapshot of the entire chain
    pub fn get_chain(&self) -> Vec<Block> {
        self.chain.read().clone()
    }

    /// Validates the ledger's own chain
    pub fn is_chain_valid(&self) -> bool {
        let chain = self.chain.read();
        self.is_valid_chain(&chain)
    }

    /// Validates the given chain against this ledger's difficulty
    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        match self.check_chain(chain) {
            Ok(()) => true,
            Err(err) => {
                warn!("Chain validation failed: {}", err);
                false
            }
        }
    }

    /// Validates the given chain and reports the first violation
    ///
    /// Every block after genesis must link to its predecessor's hash, carry
    /// a hash matching its contents and satisfy the difficulty. The genesis
    /// block itself is trusted.
    pub fn check_chain(&self, chain: &[Block]) -> Result<(), LedgerError> {
        for pair in chain.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);

            if current.previous_hash() != previous.hash() {
                return Err(LedgerError::InvalidChain(format!(
                    "block {} does not link to block {}",
                    current.index(),
                    previous.index()
                )));
            }

            if current.compute_hash() != current.hash() {
                return Err(LedgerError::InvalidChain(format!(
                    "block {} hash does not match its contents",
                    current.index()
                )));
            }

            if !meets_difficulty(current.hash(), self.difficulty) {
                return Err(LedgerError::InvalidChain(format!(
                    "block {} does not meet difficulty {}",
                    current.index(),
                    self.difficulty
                )));
            }
        }

        Ok(())
    }

    /// Gets every transaction involving a vehicle, oldest first
    pub fn get_vehicle_history(&self, vehicle_id: &str) -> Vec<HistoryEntry> {
        let chain = self.chain.read();

        chain
            .iter()
            .flat_map(|block| {
                block
                    .transactions()
                    .iter()
                    .filter(|transaction| transaction.vehicle_id == vehicle_id)
                    .map(move |transaction| HistoryEntry {
                        index: block.index(),
                        timestamp: block.timestamp(),
                        transaction: transaction.clone(),
                    })
            })
            .collect()
    }
}
