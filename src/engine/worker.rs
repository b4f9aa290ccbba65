//! The single signing worker.
//!
//! Drains the submission queue one transfer at a time and holds the signing
//! session across the whole sign, broadcast and retry cycle of a transfer.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::identity::{SignError, SigningIdentity, SigningSession};
use crate::ledger::{BroadcastError, Disposition, LedgerClient};
use crate::model::{FailureKind, TransferOutcome, TransferReceipt, TxHash};
use crate::tx::SignedTx;
use crate::{Address, Coins};

use super::queue::PendingTransfer;
use super::retry::{RetryPolicy, RetryState, Verdict};

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub broadcasts: u64,
    pub reconciliations: u64,
    /// Outcomes nobody was waiting for anymore.
    pub discarded: u64,
}

enum AttemptError {
    Sign(SignError),
    Ledger(BroadcastError),
}

impl From<SignError> for AttemptError {
    fn from(e: SignError) -> Self {
        AttemptError::Sign(e)
    }
}

impl From<BroadcastError> for AttemptError {
    fn from(e: BroadcastError) -> Self {
        AttemptError::Ledger(e)
    }
}

pub struct Worker<L: ?Sized> {
    identity: Arc<SigningIdentity>,
    ledger: Arc<L>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    stats: WorkerStats,
}

impl<L: LedgerClient + ?Sized> Worker<L> {
    pub fn new(
        identity: Arc<SigningIdentity>,
        ledger: Arc<L>,
        retry: RetryPolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            ledger,
            retry,
            attempt_timeout,
            stats: WorkerStats::default(),
        }
    }

    /// Process transfers until the queue is closed and empty.
    ///
    /// A shutdown signal closes the queue to new transfers; the ones already
    /// queued are still processed.
    pub async fn run(
        mut self,
        mut stream: ReceiverStream<PendingTransfer>,
        mut shutdown: watch::Receiver<bool>,
    ) -> WorkerStats {
        info!(
            account = %self.identity.address(),
            key = self.identity.name(),
            "transfer worker started"
        );

        let mut closing = false;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed(), if !closing => {
                    closing = true;
                    stream.close();
                    info!("submission queue closed");
                }
                next = stream.next() => match next {
                    Some(pending) => self.process(pending).await,
                    None => break,
                },
            }
        }

        info!(
            processed = self.stats.processed,
            succeeded = self.stats.succeeded,
            failed = self.stats.failed,
            broadcasts = self.stats.broadcasts,
            reconciliations = self.stats.reconciliations,
            "transfer worker stopped"
        );
        self.stats
    }

    async fn process(&mut self, pending: PendingTransfer) {
        self.stats.processed += 1;
        let outcome = self.deliver(&pending.recipient, &pending.coins).await;

        if outcome.is_success() {
            self.stats.succeeded += 1;
        } else {
            self.stats.failed += 1;
        }

        if !pending.complete(outcome) {
            self.stats.discarded += 1;
            debug!("caller stopped waiting, outcome discarded");
        }
    }

    /// Run one transfer to a terminal outcome.
    async fn deliver(&mut self, recipient: &Address, coins: &Coins) -> TransferOutcome {
        let identity = Arc::clone(&self.identity);
        let mut session = identity.lock().await;

        let mut state = RetryState::start();
        let mut signed: Option<SignedTx> = None;
        let mut accepted: Option<(TxHash, u64)> = None;
        let mut last_error: Option<BroadcastError> = None;
        let mut attempts = 0;

        loop {
            match state {
                RetryState::Attempting { attempt } | RetryState::Retrying { attempt } => {
                    attempts = attempt;
                    match self
                        .attempt(&mut session, &mut signed, recipient, coins)
                        .await
                    {
                        Ok(result) => {
                            accepted = Some(result);
                            state = state.on_attempt(Disposition::Accepted, &self.retry);
                        }
                        Err(AttemptError::Sign(e)) => {
                            warn!(recipient = %recipient, reason = %e, "transfer could not be signed");
                            return TransferOutcome::Failure {
                                kind: FailureKind::SigningFailed,
                                message: e.to_string(),
                            };
                        }
                        Err(AttemptError::Ledger(e)) => {
                            if e.is_sequence_mismatch() {
                                session.mark_stale();
                                signed = None;
                            }
                            warn!(
                                recipient = %recipient,
                                attempt,
                                reason = %e,
                                "broadcast failed"
                            );
                            state = state.on_attempt(e.disposition(), &self.retry);
                            last_error = Some(e);
                        }
                    }
                }
                RetryState::Backoff { attempt, delay } => {
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                    tokio::time::sleep(delay).await;
                    state = state.on_backoff_elapsed();
                }
                RetryState::Terminal(verdict) => {
                    // The sequence stays consumed; a ledger that disagrees
                    // reports a mismatch on the next transfer.
                    return Self::outcome(verdict, accepted, last_error, recipient, coins, attempts);
                }
            }
        }
    }

    /// One reconcile-if-needed, sign-if-needed and broadcast round.
    ///
    /// A transaction that was signed but not confirmed is broadcast again as
    /// is; only a sequence mismatch (which drops it) leads to a fresh signature.
    async fn attempt(
        &mut self,
        session: &mut SigningSession<'_>,
        signed: &mut Option<SignedTx>,
        recipient: &Address,
        coins: &Coins,
    ) -> Result<(TxHash, u64), AttemptError> {
        if session.is_stale() {
            self.stats.reconciliations += 1;
            timeout(self.attempt_timeout, session.reconcile(self.ledger.as_ref()))
                .await
                .map_err(|_| BroadcastError::Timeout)??;
        }

        let tx = match signed.take() {
            Some(tx) => tx,
            None => session.sign(recipient, coins)?,
        };
        let sequence = tx.sequence();

        self.stats.broadcasts += 1;
        let result = timeout(self.attempt_timeout, self.ledger.broadcast(&tx)).await;
        *signed = Some(tx);

        match result {
            Err(_elapsed) => Err(BroadcastError::Timeout.into()),
            Ok(Ok(hash)) | Ok(Err(BroadcastError::AlreadyKnown(hash))) => Ok((hash, sequence)),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    fn outcome(
        verdict: Verdict,
        accepted: Option<(TxHash, u64)>,
        last_error: Option<BroadcastError>,
        recipient: &Address,
        coins: &Coins,
        attempts: u32,
    ) -> TransferOutcome {
        match (verdict, accepted, last_error) {
            (Verdict::Delivered, Some((tx_hash, sequence)), _) => {
                info!(
                    recipient = %recipient,
                    coins = %coins,
                    tx_hash = %tx_hash,
                    sequence,
                    attempts,
                    "transfer delivered"
                );
                TransferOutcome::Success(TransferReceipt {
                    tx_hash,
                    sequence,
                    recipient: recipient.clone(),
                    coins: coins.clone(),
                    attempts,
                })
            }
            (Verdict::Rejected, _, Some(e)) => TransferOutcome::Failure {
                kind: e.failure_kind(),
                message: e.to_string(),
            },
            (_, _, last_error) => {
                let reason = last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
                TransferOutcome::Failure {
                    kind: FailureKind::BroadcastExhausted,
                    message: format!("gave up after {attempts} attempts: {reason}"),
                }
            }
        }
    }
}
