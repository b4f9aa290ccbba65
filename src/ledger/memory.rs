use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use tracing::debug;

use super::{BroadcastError, LedgerClient};
use crate::model::TxHash;
use crate::tx::SignedTx;
use crate::{Address, Coins, Denom};

#[derive(Debug, Default)]
struct Account {
    sequence: u64,
    balances: BTreeMap<Denom, u64>,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<Address, Account>,
    /// Hashes of accepted transactions.
    accepted: HashSet<TxHash>,
    broadcasts: usize,
}

/// A single-node devnet ledger kept in memory.
///
/// Performs the checks a real chain applies to a bank transfer: chain id,
/// signature, signer ownership, sequence number, known denominations and
/// balances. Accepted transactions take effect immediately.
#[derive(Debug)]
pub struct InMemoryLedger {
    chain_id: String,
    denoms: BTreeSet<Denom>,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(chain_id: impl Into<String>, denoms: impl IntoIterator<Item = Denom>) -> Self {
        Self {
            chain_id: chain_id.into(),
            denoms: denoms.into_iter().collect(),
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Mint `coins` into `address`.
    pub fn fund(&self, address: &Address, coins: &Coins) {
        let mut state = self.state();
        let account = state.accounts.entry(address.clone()).or_default();
        for coin in coins {
            *account.balances.entry(coin.denom.clone()).or_default() += coin.amount;
        }
    }

    pub fn balance(&self, address: &Address, denom: &Denom) -> u64 {
        self.state()
            .accounts
            .get(address)
            .and_then(|account| account.balances.get(denom))
            .copied()
            .unwrap_or(0)
    }

    pub fn sequence(&self, address: &Address) -> u64 {
        self.state()
            .accounts
            .get(address)
            .map_or(0, |account| account.sequence)
    }

    /// Number of broadcast calls received, accepted or not.
    pub fn broadcasts(&self) -> usize {
        self.state().broadcasts
    }

    /// Number of distinct transactions accepted.
    pub fn accepted(&self) -> usize {
        self.state().accepted.len()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // only mutated once every check has passed
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn apply(&self, tx: &SignedTx) -> Result<TxHash, BroadcastError> {
        let hash = tx
            .hash()
            .map_err(|e| BroadcastError::Rejected(e.to_string()))?;
        let body = tx.body();

        let mut state = self.state();
        state.broadcasts += 1;

        if state.accepted.contains(&hash) {
            return Err(BroadcastError::AlreadyKnown(hash));
        }
        if body.chain_id != self.chain_id {
            return Err(BroadcastError::Rejected(format!(
                "wrong chain id '{}'",
                body.chain_id
            )));
        }
        if !tx.verify() {
            return Err(BroadcastError::Rejected(
                "signature verification failed".to_string(),
            ));
        }
        let signer = Address::from_public_key(tx.public_key(), body.from.prefix())
            .map_err(|e| BroadcastError::Rejected(e.to_string()))?;
        if signer != body.from {
            return Err(BroadcastError::Rejected(format!(
                "signer does not own account {}",
                body.from
            )));
        }
        if body.to.prefix() != body.from.prefix() || body.to == body.from {
            return Err(BroadcastError::InvalidRecipient(body.to.to_string()));
        }
        if let Some(coin) = body.coins.iter().find(|c| !self.denoms.contains(&c.denom)) {
            return Err(BroadcastError::RejectedDenom(coin.denom.clone()));
        }

        let sender = state.accounts.entry(body.from.clone()).or_default();
        if body.sequence != sender.sequence {
            return Err(BroadcastError::SequenceMismatch {
                expected: sender.sequence,
                got: body.sequence,
            });
        }
        for coin in &body.coins {
            let available = sender.balances.get(&coin.denom).copied().unwrap_or(0);
            if available < coin.amount {
                return Err(BroadcastError::InsufficientFunds(format!(
                    "{available}{} available, {coin} required",
                    coin.denom
                )));
            }
        }

        for coin in &body.coins {
            if let Some(balance) = sender.balances.get_mut(&coin.denom) {
                *balance -= coin.amount;
            }
        }
        sender.sequence += 1;

        let receiver = state.accounts.entry(body.to.clone()).or_default();
        for coin in &body.coins {
            *receiver.balances.entry(coin.denom.clone()).or_default() += coin.amount;
        }
        state.accepted.insert(hash.clone());

        debug!(tx_hash = %hash, sequence = body.sequence, to = %body.to, "transaction accepted");
        Ok(hash)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn broadcast(&self, tx: &SignedTx) -> Result<TxHash, BroadcastError> {
        self.apply(tx)
    }

    async fn account_sequence(&self, address: &Address) -> Result<u64, BroadcastError> {
        Ok(self.sequence(address))
    }
}
