//! Transfer transactions and their canonical encoding.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::TxHash;
use crate::{Address, Coins};

/// The signed part of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    pub chain_id: String,
    pub from: Address,
    pub to: Address,
    pub coins: Coins,
    pub sequence: u64,
}

impl TxBody {
    /// Bytes covered by the signature.
    pub fn sign_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }
}

/// A transfer ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    body: TxBody,
    public_key: [u8; 32],
    signature: Vec<u8>,
}

impl SignedTx {
    pub(crate) fn new(body: TxBody, public_key: [u8; 32], signature: [u8; 64]) -> Self {
        Self {
            body,
            public_key,
            signature: signature.to_vec(),
        }
    }

    pub fn body(&self) -> &TxBody {
        &self.body
    }

    pub fn sequence(&self) -> u64 {
        self.body.sequence
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// Encoded transaction as submitted to the ledger.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Upper-case hex SHA-256 of the encoded transaction.
    pub fn hash(&self) -> Result<TxHash, bincode::Error> {
        let digest = Sha256::digest(self.to_bytes()?);
        Ok(hex::encode_upper(digest))
    }

    /// Check the signature against the embedded public key.
    pub fn verify(&self) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&self.signature) else {
            return false;
        };
        let Ok(message) = self.body.sign_bytes() else {
            return false;
        };
        key.verify(&message, &signature).is_ok()
    }
}
