//! Ledger client seam.
//!
//! The engine only needs two things from a ledger: broadcasting a signed
//! transaction and reading an account's authoritative sequence number.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{FailureKind, TxHash};
use crate::tx::SignedTx;
use crate::{Address, Denom};

mod memory;
pub use memory::InMemoryLedger;

/// A broadcast or query that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    // === Transient ===
    #[error("ledger did not answer in time")]
    Timeout,

    #[error("mempool is full")]
    MempoolFull,

    #[error("account sequence mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u64, got: u64 },

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    // === Permanent ===
    #[error("insufficient faucet funds: {0}")]
    InsufficientFunds(String),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("denomination {0} rejected")]
    RejectedDenom(Denom),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    // === Neither ===
    /// The exact transaction is already known to the ledger.
    #[error("transaction {0} already known")]
    AlreadyKnown(TxHash),
}

/// How the worker should react to a broadcast result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accepted,
    Transient,
    Permanent,
}

impl BroadcastError {
    pub fn disposition(&self) -> Disposition {
        match self {
            BroadcastError::Timeout
            | BroadcastError::MempoolFull
            | BroadcastError::SequenceMismatch { .. }
            | BroadcastError::Unavailable(_) => Disposition::Transient,
            BroadcastError::InsufficientFunds(_)
            | BroadcastError::InvalidRecipient(_)
            | BroadcastError::RejectedDenom(_)
            | BroadcastError::Rejected(_) => Disposition::Permanent,
            BroadcastError::AlreadyKnown(_) => Disposition::Accepted,
        }
    }

    pub fn is_sequence_mismatch(&self) -> bool {
        matches!(self, BroadcastError::SequenceMismatch { .. })
    }

    /// Failure reported to the caller when this error ends a transfer.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            BroadcastError::InsufficientFunds(_) => FailureKind::InsufficientFunds,
            BroadcastError::InvalidRecipient(_) => FailureKind::InvalidRecipient,
            BroadcastError::RejectedDenom(_) => FailureKind::RejectedDenom,
            BroadcastError::Rejected(_) => FailureKind::Rejected,
            _ => FailureKind::BroadcastExhausted,
        }
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a signed transaction; returns its hash once accepted into the mempool.
    async fn broadcast(&self, tx: &SignedTx) -> Result<TxHash, BroadcastError>;

    /// Next sequence number the ledger expects from `address`.
    async fn account_sequence(&self, address: &Address) -> Result<u64, BroadcastError>;
}
