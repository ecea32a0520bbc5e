// Blockchain module
//
// This module contains the ledger core:
// - Block structure and content hashing
// - Vehicle transfer transactions and intake validation
// - The ledger with proof of work, chain validation and history lookup

pub mod block;
pub mod chain;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{HistoryEntry, Ledger, LedgerError};
