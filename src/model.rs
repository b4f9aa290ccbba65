//! Core domain types for the transfer engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Address, Coins};

/// Hex encoded hash of a signed transaction.
pub type TxHash = String;

/// A transfer request as handed over by the transport layer.
///
/// The human-verification check has already passed by the time a request
/// reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Account address to credit.
    #[serde(rename = "address")]
    pub recipient: String,
    /// Requested coins as `"<amount><denom>"` strings; the default coin set is
    /// used when empty.
    #[serde(default)]
    pub coins: Vec<String>,
}

impl TransferRequest {
    pub fn new(recipient: impl Into<String>, coins: Vec<String>) -> Self {
        Self {
            recipient: recipient.into(),
            coins,
        }
    }
}

/// Classification of every failure the engine can surface.
///
/// Mapping a kind to a transport status code is left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad address or coin; the caller's fault, never retried.
    InvalidInput,
    /// Above the credit ceiling; the caller's fault, never retried.
    PolicyRejected,
    /// Queue full or worker unavailable; retry later.
    Congestion,
    /// Network, mempool or sequence trouble that outlived the retry budget.
    TransientLedger,
    /// Rejected by the ledger for good.
    PermanentLedger,
    /// The caller gave up waiting.
    Canceled,
    /// The faucet itself could not build or sign a transaction.
    Internal,
}

impl ErrorKind {
    /// Stable identifier for responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::PolicyRejected => "POLICY_REJECTED",
            ErrorKind::Congestion => "CONGESTION",
            ErrorKind::TransientLedger => "TRANSIENT_LEDGER_ERROR",
            ErrorKind::PermanentLedger => "PERMANENT_LEDGER_ERROR",
            ErrorKind::Canceled => "CANCELED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Congestion | ErrorKind::TransientLedger)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Why a dequeued transfer did not make it onto the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Key material or transaction construction failed.
    SigningFailed,
    /// The faucet account cannot cover the coins.
    InsufficientFunds,
    /// The ledger refused the recipient.
    InvalidRecipient,
    /// The ledger does not know one of the denominations.
    RejectedDenom,
    /// Any other non-retryable ledger rejection.
    Rejected,
    /// Every attempt failed with a transient error.
    BroadcastExhausted,
}

impl FailureKind {
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            FailureKind::SigningFailed => ErrorKind::Internal,
            FailureKind::InsufficientFunds
            | FailureKind::InvalidRecipient
            | FailureKind::RejectedDenom
            | FailureKind::Rejected => ErrorKind::PermanentLedger,
            FailureKind::BroadcastExhausted => ErrorKind::TransientLedger,
        }
    }
}

/// Proof that a transfer was accepted by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub tx_hash: TxHash,
    pub sequence: u64,
    pub recipient: Address,
    pub coins: Coins,
    /// Broadcast attempts it took, including the successful one.
    pub attempts: u32,
}

/// Terminal result of a dequeued transfer, delivered at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success(TransferReceipt),
    Failure { kind: FailureKind, message: String },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success(_))
    }

    pub fn receipt(&self) -> Option<&TransferReceipt> {
        match self {
            TransferOutcome::Success(receipt) => Some(receipt),
            TransferOutcome::Failure { .. } => None,
        }
    }
}

/// Discovery payload advertising the faucet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetInfo {
    pub is_a_faucet: bool,
    pub chain_id: String,
}

impl FaucetInfo {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            is_a_faucet: true,
            chain_id: chain_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_transport_field_names() {
        let request: TransferRequest =
            serde_json::from_str(r#"{"address":"cosmos1xyz","coins":["5atom"]}"#).unwrap();
        assert_eq!(request.recipient, "cosmos1xyz");
        assert_eq!(request.coins, vec!["5atom".to_string()]);
    }

    #[test]
    fn request_coins_default_to_empty() {
        let request: TransferRequest = serde_json::from_str(r#"{"address":"cosmos1xyz"}"#).unwrap();
        assert!(request.coins.is_empty());
    }

    #[test]
    fn failure_kind_classification() {
        assert_eq!(
            FailureKind::BroadcastExhausted.error_kind(),
            ErrorKind::TransientLedger
        );
        assert_eq!(
            FailureKind::InsufficientFunds.error_kind(),
            ErrorKind::PermanentLedger
        );
        assert_eq!(FailureKind::SigningFailed.error_kind(), ErrorKind::Internal);
    }

    #[test]
    fn only_congestion_and_transient_are_retryable() {
        assert!(ErrorKind::Congestion.is_retryable());
        assert!(ErrorKind::TransientLedger.is_retryable());
        assert!(!ErrorKind::InvalidInput.is_retryable());
        assert!(!ErrorKind::PolicyRejected.is_retryable());
        assert!(!ErrorKind::Canceled.is_retryable());
    }

    #[test]
    fn faucet_info_advertises_faucet() {
        let info = FaucetInfo::new("testnet-1");
        assert!(info.is_a_faucet);
        assert_eq!(info.chain_id, "testnet-1");
    }
}
