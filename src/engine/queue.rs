//! Bounded submission queue between callers and the signing worker.

use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::model::TransferOutcome;
use crate::{Address, Coins};

use super::error::QueueError;

/// An approved transfer waiting for the signer.
#[derive(Debug)]
pub struct PendingTransfer {
    pub recipient: Address,
    pub coins: Coins,
    reply: oneshot::Sender<TransferOutcome>,
}

impl PendingTransfer {
    /// Create a transfer along with the receiver its outcome will arrive on.
    pub fn new(recipient: Address, coins: Coins) -> (Self, oneshot::Receiver<TransferOutcome>) {
        let (reply, outcome) = oneshot::channel();
        (
            Self {
                recipient,
                coins,
                reply,
            },
            outcome,
        )
    }

    /// Deliver the outcome. Returns `false` if the caller stopped waiting.
    pub fn complete(self, outcome: TransferOutcome) -> bool {
        self.reply.send(outcome).is_ok()
    }
}

/// Producer side of the queue; cheap to clone.
#[derive(Debug, Clone)]
pub struct SubmissionQueue {
    sender: mpsc::Sender<PendingTransfer>,
}

impl SubmissionQueue {
    /// Create a queue holding at most `capacity` transfers, and the stream draining it.
    pub fn bounded(capacity: usize) -> (Self, ReceiverStream<PendingTransfer>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, ReceiverStream::new(receiver))
    }

    /// Enqueue without waiting; a full queue is reported to the caller.
    pub fn enqueue(&self, transfer: PendingTransfer) -> Result<(), QueueError> {
        self.sender.try_send(transfer).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Free slots left.
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }
}
