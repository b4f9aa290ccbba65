//! Transfer engine.
//!
//! Many callers submit transfers concurrently; a single worker signs and
//! broadcasts them one at a time with the faucet identity. Callers wait on a
//! per-transfer channel and may stop waiting at any time without affecting
//! the transfer itself.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{ConfigError, FaucetConfig};
use crate::identity::SigningIdentity;
use crate::ledger::LedgerClient;
use crate::model::{FaucetInfo, TransferOutcome, TransferRequest};
use crate::policy::CreditPolicy;
use crate::Address;

mod error;
pub use error::{QueueError, TransferError};

mod queue;
pub use queue::{PendingTransfer, SubmissionQueue};

mod retry;
pub use retry::{RetryPolicy, RetryState, Verdict};

mod worker;
pub use worker::{Worker, WorkerStats};

/// The transfer engine.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Engine {
    policy: CreditPolicy,
    queue: SubmissionQueue,
    address_prefix: String,
    faucet_address: Address,
    info: FaucetInfo,
    shutdown: watch::Sender<bool>,
}

/// Public API
impl Engine {
    /// Spawn the signing worker and return the engine feeding it.
    ///
    /// The worker's handle resolves with its statistics once the engine is
    /// shut down (or dropped) and the queue has drained.
    pub fn start<L>(
        config: &FaucetConfig,
        identity: SigningIdentity,
        ledger: Arc<L>,
    ) -> Result<(Self, JoinHandle<WorkerStats>), ConfigError>
    where
        L: LedgerClient + ?Sized + 'static,
    {
        let policy = CreditPolicy::new(config.policy_config()?);
        let (queue, stream) = SubmissionQueue::bounded(config.queue_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let faucet_address = identity.address().clone();
        let worker = Worker::new(
            Arc::new(identity),
            ledger,
            config.retry_policy(),
            config.attempt_timeout(),
        );
        let handle = tokio::spawn(worker.run(stream, shutdown_rx));

        info!(
            chain_id = %config.chain_id,
            account = %faucet_address,
            default_coins = %policy.default_coins(),
            queue_capacity = config.queue_capacity,
            "faucet engine started"
        );

        let engine = Self {
            policy,
            queue,
            address_prefix: config.address_prefix.clone(),
            faucet_address,
            info: FaucetInfo::new(config.chain_id.clone()),
            shutdown,
        };
        Ok((engine, handle))
    }

    /// Transfer coins and wait for the outcome.
    ///
    /// Dropping the returned future stops the wait, not the transfer.
    pub async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, TransferError> {
        let result = match self.submit(request) {
            Ok(outcome) => outcome.await.map_err(|_| TransferError::WorkerGone),
            Err(e) => Err(e),
        };
        Self::log_result(request, &result);
        result
    }

    /// Like [`transfer`](Self::transfer), but gives up with
    /// [`TransferError::Canceled`] as soon as `cancel` completes.
    ///
    /// A transfer that was already queued still runs to completion; its
    /// outcome is discarded.
    pub async fn transfer_until<F>(
        &self,
        request: &TransferRequest,
        cancel: F,
    ) -> Result<TransferOutcome, TransferError>
    where
        F: Future<Output = ()>,
    {
        let outcome = match self.submit(request) {
            Ok(outcome) => outcome,
            Err(e) => {
                let result = Err(e);
                Self::log_result(request, &result);
                return result;
            }
        };

        let result = tokio::select! {
            result = outcome => result.map_err(|_| TransferError::WorkerGone),
            () = cancel => Err(TransferError::Canceled),
        };
        Self::log_result(request, &result);
        result
    }

    /// Discovery payload for the transport layer.
    pub fn info(&self) -> &FaucetInfo {
        &self.info
    }

    pub fn faucet_address(&self) -> &Address {
        &self.faucet_address
    }

    pub fn policy(&self) -> &CreditPolicy {
        &self.policy
    }

    /// Stop accepting transfers; queued ones are still processed.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Private API
impl Engine {
    /// Validate, approve and enqueue a request.
    ///
    /// Nothing reaches the queue unless the recipient and coins are acceptable.
    fn submit(
        &self,
        request: &TransferRequest,
    ) -> Result<oneshot::Receiver<TransferOutcome>, TransferError> {
        let recipient = Address::parse(request.recipient.trim(), &self.address_prefix)?;
        if recipient == self.faucet_address {
            return Err(TransferError::FaucetRecipient(recipient));
        }

        let coins = self.policy.approve(&request.coins)?;

        let (pending, outcome) = PendingTransfer::new(recipient, coins);
        self.queue.enqueue(pending)?;
        Ok(outcome)
    }

    /// Small helper to log `transfer` results
    fn log_result(request: &TransferRequest, result: &Result<TransferOutcome, TransferError>) {
        match result {
            Ok(TransferOutcome::Success(receipt)) => {
                info!(
                    recipient = %receipt.recipient,
                    coins = %receipt.coins,
                    tx_hash = %receipt.tx_hash,
                    "transfer completed"
                );
            }
            Ok(TransferOutcome::Failure { kind, message }) => {
                info!(
                    recipient = %request.recipient,
                    kind = ?kind,
                    reason = %message,
                    "transfer failed"
                );
            }
            Err(e) => {
                info!(
                    recipient = %request.recipient,
                    kind = %e.kind(),
                    reason = %e,
                    "transfer skipped"
                );
            }
        }
    }
}
