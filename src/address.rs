//! Bech32 account addresses.

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Account addresses carry a 20 byte hash, module accounts a 32 byte one.
const ACCOUNT_LEN: usize = 20;
const MODULE_ACCOUNT_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid bech32 address '{address}': {reason}")]
    Bech32 { address: String, reason: String },

    #[error("invalid address prefix: expected '{expected}', got '{got}'")]
    Prefix { expected: String, got: String },

    #[error("invalid address length: {0} bytes")]
    Length(usize),

    #[error("invalid address prefix '{0}'")]
    InvalidPrefix(String),
}

/// A checksummed bech32 account address, stored in canonical lower case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    encoded: String,
    prefix_len: usize,
}

impl Address {
    /// Parse an address and require the given human-readable prefix.
    pub fn parse(value: &str, prefix: &str) -> Result<Self, AddressError> {
        let address: Address = value.parse()?;
        if !address.prefix().eq_ignore_ascii_case(prefix) {
            return Err(AddressError::Prefix {
                expected: prefix.to_string(),
                got: address.prefix().to_string(),
            });
        }
        Ok(address)
    }

    /// Derive the account address of an ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32], prefix: &str) -> Result<Self, AddressError> {
        let hash = Sha256::digest(public_key);
        Self::from_bytes(&hash[..ACCOUNT_LEN], prefix)
    }

    pub fn from_bytes(bytes: &[u8], prefix: &str) -> Result<Self, AddressError> {
        let hrp = Hrp::parse(prefix).map_err(|_| AddressError::InvalidPrefix(prefix.to_string()))?;
        let prefix_len = hrp.as_str().len();
        let encoded = bech32::encode::<Bech32>(hrp, bytes).map_err(|e| AddressError::Bech32 {
            address: prefix.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Address {
            encoded: encoded.to_ascii_lowercase(),
            prefix_len,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.encoded[..self.prefix_len]
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

/// Accepts any prefix; use [`Address::parse`] to pin one.
impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hrp, data) = bech32::decode(s).map_err(|e| AddressError::Bech32 {
            address: s.to_string(),
            reason: e.to_string(),
        })?;

        if data.len() != ACCOUNT_LEN && data.len() != MODULE_ACCOUNT_LEN {
            return Err(AddressError::Length(data.len()));
        }

        Ok(Address {
            encoded: s.to_ascii_lowercase(),
            prefix_len: hrp.as_str().len(),
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.encoded
    }
}
