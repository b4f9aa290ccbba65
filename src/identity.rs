//! The faucet's signing identity.
//!
//! The key and the account sequence number live here and nowhere else. The
//! only way to sign is through a [`SigningSession`], which holds the
//! identity's lock for as long as it exists, so two transactions can never
//! be built from the same sequence number.

use ed25519_dalek::{SECRET_KEY_LENGTH, Signer, SigningKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::ledger::{BroadcastError, LedgerClient};
use crate::tx::{SignedTx, TxBody};
use crate::{Address, AddressError, Coins};

#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid signing key material")]
    InvalidKey,

    #[error("invalid faucet address: {0}")]
    Address(#[from] AddressError),

    #[error("sequence must be reconciled with the ledger before signing")]
    StaleSequence,

    #[error("account sequence exhausted")]
    SequenceOverflow,

    #[error("cannot encode transaction: {0}")]
    Encode(#[from] bincode::Error),
}

#[derive(Debug)]
struct SequenceState {
    next: u64,
    /// Set until the sequence has been read from the ledger, and again after a mismatch.
    stale: bool,
}

/// The faucet account: key material plus its sequence number.
pub struct SigningIdentity {
    name: String,
    chain_id: String,
    signing_key: SigningKey,
    address: Address,
    sequence: Mutex<SequenceState>,
}

impl SigningIdentity {
    /// Load from a hex encoded 32 byte ed25519 secret (optionally `0x` prefixed).
    pub fn from_hex(
        name: impl Into<String>,
        secret_hex: &str,
        chain_id: impl Into<String>,
        prefix: &str,
    ) -> Result<Self, SignError> {
        let bytes = hex::decode(secret_hex.trim().trim_start_matches("0x"))
            .map_err(|_| SignError::InvalidKey)?;
        let secret: [u8; SECRET_KEY_LENGTH] =
            bytes.try_into().map_err(|_| SignError::InvalidKey)?;
        Self::from_key(name, SigningKey::from_bytes(&secret), chain_id, prefix)
    }

    /// Fresh random key, for throwaway devnets.
    pub fn generate(
        name: impl Into<String>,
        chain_id: impl Into<String>,
        prefix: &str,
    ) -> Result<Self, SignError> {
        Self::from_key(name, SigningKey::generate(&mut OsRng), chain_id, prefix)
    }

    fn from_key(
        name: impl Into<String>,
        signing_key: SigningKey,
        chain_id: impl Into<String>,
        prefix: &str,
    ) -> Result<Self, SignError> {
        let address = Address::from_public_key(&signing_key.verifying_key().to_bytes(), prefix)?;
        Ok(Self {
            name: name.into(),
            chain_id: chain_id.into(),
            signing_key,
            address,
            sequence: Mutex::new(SequenceState {
                next: 0,
                stale: true,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Wait for exclusive use of the identity.
    pub async fn lock(&self) -> SigningSession<'_> {
        SigningSession {
            identity: self,
            state: self.sequence.lock().await,
        }
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("name", &self.name)
            .field("chain_id", &self.chain_id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a [`SigningIdentity`].
pub struct SigningSession<'a> {
    identity: &'a SigningIdentity,
    state: MutexGuard<'a, SequenceState>,
}

impl SigningSession<'_> {
    /// Sequence number the next signed transaction will carry.
    pub fn sequence(&self) -> u64 {
        self.state.next
    }

    pub fn is_stale(&self) -> bool {
        self.state.stale
    }

    /// Distrust the local sequence until the next [`reconcile`](Self::reconcile).
    pub fn mark_stale(&mut self) {
        self.state.stale = true;
    }

    /// Reset the sequence number from the ledger's view of the account.
    pub async fn reconcile<L: LedgerClient + ?Sized>(
        &mut self,
        ledger: &L,
    ) -> Result<u64, BroadcastError> {
        let sequence = ledger.account_sequence(&self.identity.address).await?;
        info!(
            account = %self.identity.address,
            local = self.state.next,
            ledger = sequence,
            "sequence reconciled"
        );
        self.state.next = sequence;
        self.state.stale = false;
        Ok(sequence)
    }

    /// Build and sign a transfer of `coins` to `to`, consuming one sequence number.
    pub fn sign(&mut self, to: &Address, coins: &Coins) -> Result<SignedTx, SignError> {
        if self.state.stale {
            return Err(SignError::StaleSequence);
        }

        let sequence = self.state.next;
        let next = sequence.checked_add(1).ok_or(SignError::SequenceOverflow)?;

        let body = TxBody {
            chain_id: self.identity.chain_id.clone(),
            from: self.identity.address.clone(),
            to: to.clone(),
            coins: coins.clone(),
            sequence,
        };
        let signature = self.identity.signing_key.sign(&body.sign_bytes()?);
        let public_key = self.identity.signing_key.verifying_key().to_bytes();

        self.state.next = next;
        debug!(sequence, to = %to, coins = %coins, "transfer signed");

        Ok(SignedTx::new(body, public_key, signature.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Denom;
    use crate::ledger::InMemoryLedger;

    const SECRET: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    fn identity() -> SigningIdentity {
        SigningIdentity::from_hex("faucet", SECRET, "testnet", "cosmos").unwrap()
    }

    fn recipient() -> Address {
        Address::from_bytes(&[1u8; 20], "cosmos").unwrap()
    }

    #[test]
    fn from_hex_is_deterministic() {
        let a = identity();
        let b = SigningIdentity::from_hex("other", &format!("0x{SECRET}"), "testnet", "cosmos")
            .unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.address().prefix(), "cosmos");
    }

    #[test]
    fn from_hex_rejects_bad_key() {
        assert!(matches!(
            SigningIdentity::from_hex("faucet", "abcd", "testnet", "cosmos"),
            Err(SignError::InvalidKey)
        ));
        assert!(matches!(
            SigningIdentity::from_hex("faucet", "zz", "testnet", "cosmos"),
            Err(SignError::InvalidKey)
        ));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let printed = format!("{:?}", identity());
        assert!(!printed.contains(SECRET));
        assert!(printed.contains("faucet"));
    }

    #[tokio::test]
    async fn new_identity_must_reconcile_before_signing() {
        let identity = identity();
        let mut session = identity.lock().await;
        assert!(session.is_stale());
        let result = session.sign(&recipient(), &"5atom".parse().unwrap());
        assert!(matches!(result, Err(SignError::StaleSequence)));
    }

    #[tokio::test]
    async fn sign_consumes_one_sequence_number() {
        let identity = identity();
        let ledger = InMemoryLedger::new("testnet", [Denom::parse("atom").unwrap()]);
        let mut session = identity.lock().await;
        session.reconcile(&ledger).await.unwrap();

        let coins: Coins = "5atom".parse().unwrap();
        let first = session.sign(&recipient(), &coins).unwrap();
        let second = session.sign(&recipient(), &coins).unwrap();

        assert_eq!(first.sequence(), 0);
        assert_eq!(second.sequence(), 1);
        assert_eq!(session.sequence(), 2);
        assert!(first.verify());
        assert_eq!(first.body().from, *identity.address());
        assert_eq!(first.body().chain_id, "testnet");
    }

    #[tokio::test]
    async fn reconcile_resets_sequence_from_ledger() {
        let identity = identity();
        let ledger = InMemoryLedger::new("testnet", [Denom::parse("atom").unwrap()]);
        let mut session = identity.lock().await;
        session.reconcile(&ledger).await.unwrap();
        session.sign(&recipient(), &"5atom".parse().unwrap()).unwrap();
        assert_eq!(session.sequence(), 1);

        session.mark_stale();
        assert!(session.is_stale());
        assert_eq!(session.reconcile(&ledger).await.unwrap(), 0);
        assert_eq!(session.sequence(), 0);
        assert!(!session.is_stale());
    }

    #[tokio::test]
    async fn tampered_transaction_fails_verification() {
        let identity = identity();
        let ledger = InMemoryLedger::new("testnet", [Denom::parse("atom").unwrap()]);
        let mut session = identity.lock().await;
        session.reconcile(&ledger).await.unwrap();
        let tx = session.sign(&recipient(), &"5atom".parse().unwrap()).unwrap();

        let mut bytes = tx.to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = SignedTx::from_bytes(&bytes).unwrap();
        assert!(!tampered.verify());

        let decoded = SignedTx::from_bytes(&tx.to_bytes().unwrap()).unwrap();
        assert!(decoded.verify());
        assert_eq!(decoded.hash().unwrap(), tx.hash().unwrap());
    }
}
