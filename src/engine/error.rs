//! Error types for transfer processing.

use thiserror::Error;

use crate::model::ErrorKind;
use crate::policy::PolicyError;
use crate::{Address, AddressError};

/// Error returned by [`SubmissionQueue::enqueue`](super::SubmissionQueue::enqueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("submission queue is full, try again later")]
    Full,

    #[error("submission queue is closed")]
    Closed,
}

/// Top-level error returned by [`Engine::transfer`](super::Engine::transfer).
///
/// Everything here is decided before or instead of a ledger result; ledger
/// failures arrive as a [`TransferOutcome::Failure`](crate::TransferOutcome).
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid recipient address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("cannot send to the faucet account {0}")]
    FaucetRecipient(Address),

    #[error("{0}")]
    Policy(#[from] PolicyError),

    #[error("{0}")]
    Queue(#[from] QueueError),

    #[error("transfer worker stopped before answering")]
    WorkerGone,

    #[error("transfer canceled by caller")]
    Canceled,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::InvalidAddress(_) | TransferError::FaucetRecipient(_) => {
                ErrorKind::InvalidInput
            }
            TransferError::Policy(e) => e.kind(),
            TransferError::Queue(_) => ErrorKind::Congestion,
            TransferError::WorkerGone => ErrorKind::Internal,
            TransferError::Canceled => ErrorKind::Canceled,
        }
    }
}
