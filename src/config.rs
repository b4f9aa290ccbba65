//! Faucet configuration, read once at startup.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::coin::{Coin, CoinError, Coins, Denom};
use crate::engine::RetryPolicy;
use crate::policy::{CreditPolicyConfig, DenomLimit};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse '{value}'")]
    Parse { var: &'static str, value: String },

    #[error("invalid coin: {0}")]
    Coin(#[from] CoinError),

    #[error("credit amount {credit_amount} exceeds max credit {max_credit}")]
    CreditAboveMax { credit_amount: u64, max_credit: u64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Hex encoded signing key. Never printed.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(hex: impl Into<String>) -> Self {
        SecretKey(hex.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Faucet service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Chain the faucet dispenses on.
    pub chain_id: String,

    /// Bech32 prefix of account addresses.
    pub address_prefix: String,

    /// Name of the faucet key, used in logs only.
    pub key_name: String,

    /// Faucet signing key; a throwaway key is generated when absent.
    pub key_secret: Option<SecretKey>,

    /// Denomination of the default coin set.
    pub denom: String,

    /// Amount dispensed per denomination and request.
    pub credit_amount: u64,

    /// Largest amount of a single denomination a request may ask for.
    pub max_credit: u64,

    /// Default coin set; `credit_amount` of `denom` when empty.
    pub default_coins: Vec<String>,

    /// Per-denomination limits overriding `credit_amount` and `max_credit`.
    pub denom_limits: BTreeMap<String, DenomLimit>,

    /// Lower requested amounts to the credit amount instead of passing them through.
    pub clamp_to_credit: bool,

    /// Transfers waiting for the signer before callers get backpressure.
    pub queue_capacity: usize,

    /// Broadcast attempts per transfer, including the first.
    pub max_attempts: u32,

    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: u32,

    /// Upper bound on a single broadcast call.
    pub attempt_timeout_ms: u64,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            chain_id: "testnet".to_string(),
            address_prefix: "cosmos".to_string(),
            key_name: "faucet".to_string(),
            key_secret: None,
            denom: "atom".to_string(),
            credit_amount: 10_000_000,
            max_credit: 100_000_000,
            default_coins: Vec::new(),
            denom_limits: BTreeMap::new(),
            clamp_to_credit: true,
            queue_capacity: 64,
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl FaucetConfig {
    /// Load from `FAUCET_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from any variable source, e.g. a map in tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("FAUCET_CHAIN_ID") {
            config.chain_id = value;
        }
        if let Some(value) = lookup("FAUCET_ADDRESS_PREFIX") {
            config.address_prefix = value;
        }
        if let Some(value) = lookup("FAUCET_KEY_NAME") {
            config.key_name = value;
        }
        if let Some(value) = lookup("FAUCET_KEY") {
            config.key_secret = Some(SecretKey(value));
        }
        if let Some(value) = lookup("FAUCET_DENOM") {
            config.denom = value;
        }
        if let Some(value) = lookup("FAUCET_CREDIT_AMOUNT") {
            config.credit_amount = parse_var("FAUCET_CREDIT_AMOUNT", &value)?;
        }
        if let Some(value) = lookup("FAUCET_MAX_CREDIT") {
            config.max_credit = parse_var("FAUCET_MAX_CREDIT", &value)?;
        }
        if let Some(value) = lookup("FAUCET_COINS") {
            config.default_coins = value
                .split(',')
                .map(str::trim)
                .filter(|coin| !coin.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = lookup("FAUCET_DENOM_LIMITS") {
            config.denom_limits = parse_denom_limits(&value)?;
        }
        if let Some(value) = lookup("FAUCET_CLAMP_TO_CREDIT") {
            config.clamp_to_credit = parse_var("FAUCET_CLAMP_TO_CREDIT", &value)?;
        }
        if let Some(value) = lookup("FAUCET_QUEUE_CAPACITY") {
            config.queue_capacity = parse_var("FAUCET_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("FAUCET_MAX_ATTEMPTS") {
            config.max_attempts = parse_var("FAUCET_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("FAUCET_INITIAL_BACKOFF_MS") {
            config.initial_backoff_ms = parse_var("FAUCET_INITIAL_BACKOFF_MS", &value)?;
        }
        if let Some(value) = lookup("FAUCET_MAX_BACKOFF_MS") {
            config.max_backoff_ms = parse_var("FAUCET_MAX_BACKOFF_MS", &value)?;
        }
        if let Some(value) = lookup("FAUCET_BACKOFF_MULTIPLIER") {
            config.backoff_multiplier = parse_var("FAUCET_BACKOFF_MULTIPLIER", &value)?;
        }
        if let Some(value) = lookup("FAUCET_ATTEMPT_TIMEOUT_MS") {
            config.attempt_timeout_ms = parse_var("FAUCET_ATTEMPT_TIMEOUT_MS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_limit(self.credit_amount, self.max_credit)?;
        for limit in self.denom_limits.values() {
            check_limit(limit.credit_amount, limit.max_credit)?;
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue_capacity"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero("max_attempts"));
        }
        if self.backoff_multiplier == 0 {
            return Err(ConfigError::Zero("backoff_multiplier"));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConfigError::Zero("attempt_timeout_ms"));
        }
        Ok(())
    }

    /// The default coin set handed out when a request names no coins.
    pub fn default_coins(&self) -> Result<Coins, ConfigError> {
        if self.default_coins.is_empty() {
            let coin = Coin::new(self.credit_amount, Denom::parse(&self.denom)?)?;
            return Ok(Coins::new(vec![coin])?);
        }

        let coins = self
            .default_coins
            .iter()
            .map(|coin| coin.parse::<Coin>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Coins::new(coins)?)
    }

    pub fn policy_config(&self) -> Result<CreditPolicyConfig, ConfigError> {
        self.validate()?;

        let overrides = self
            .denom_limits
            .iter()
            .map(|(denom, limit)| Ok((Denom::parse(denom)?, *limit)))
            .collect::<Result<BTreeMap<_, _>, CoinError>>()?;

        Ok(CreditPolicyConfig {
            default_coins: self.default_coins()?,
            credit_amount: self.credit_amount,
            max_credit: self.max_credit,
            overrides,
            clamp_to_credit: self.clamp_to_credit,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.backoff_multiplier,
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

fn check_limit(credit_amount: u64, max_credit: u64) -> Result<(), ConfigError> {
    if credit_amount == 0 {
        return Err(ConfigError::Zero("credit_amount"));
    }
    if credit_amount > max_credit {
        return Err(ConfigError::CreditAboveMax {
            credit_amount,
            max_credit,
        });
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Parse {
        var,
        value: value.to_string(),
    })
}

/// Parses `denom=credit:max` pairs separated by commas, e.g. `stake=5:50,uosmo=1:10`.
fn parse_denom_limits(value: &str) -> Result<BTreeMap<String, DenomLimit>, ConfigError> {
    const VAR: &str = "FAUCET_DENOM_LIMITS";
    let invalid = || ConfigError::Parse {
        var: VAR,
        value: value.to_string(),
    };

    let mut limits = BTreeMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (denom, amounts) = entry.split_once('=').ok_or_else(invalid)?;
        let (credit, max) = amounts.split_once(':').ok_or_else(invalid)?;
        let limit = DenomLimit {
            credit_amount: parse_var(VAR, credit)?,
            max_credit: parse_var(VAR, max)?,
        };
        limits.insert(denom.trim().to_string(), limit);
    }
    Ok(limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<FaucetConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FaucetConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.key_name, "faucet");
        assert_eq!(config.denom, "atom");
        assert_eq!(config.credit_amount, 10_000_000);
        assert_eq!(config.max_credit, 100_000_000);
        assert!(config.key_secret.is_none());
        assert!(config.clamp_to_credit);
    }

    #[test]
    fn default_coins_fall_back_to_credit_amount_of_denom() {
        let config = load(&[]).unwrap();
        assert_eq!(config.default_coins().unwrap().to_string(), "10000000atom");
    }

    #[test]
    fn env_overrides() {
        let config = load(&[
            ("FAUCET_CHAIN_ID", "devnet-7"),
            ("FAUCET_COINS", "5stake, 10atom"),
            ("FAUCET_CREDIT_AMOUNT", "10"),
            ("FAUCET_MAX_CREDIT", "20"),
            ("FAUCET_QUEUE_CAPACITY", "3"),
            ("FAUCET_CLAMP_TO_CREDIT", "false"),
        ])
        .unwrap();
        assert_eq!(config.chain_id, "devnet-7");
        assert_eq!(config.default_coins().unwrap().to_string(), "10atom,5stake");
        assert_eq!(config.queue_capacity, 3);
        assert!(!config.clamp_to_credit);
    }

    #[test]
    fn denom_limits_parse() {
        let config = load(&[("FAUCET_DENOM_LIMITS", "stake=5:50, uosmo=1:10")]).unwrap();
        assert_eq!(
            config.denom_limits.get("stake"),
            Some(&DenomLimit {
                credit_amount: 5,
                max_credit: 50
            })
        );
        assert_eq!(config.denom_limits.len(), 2);
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = load(&[("FAUCET_MAX_ATTEMPTS", "many")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Parse {
                var: "FAUCET_MAX_ATTEMPTS",
                ..
            }
        ));
    }

    #[test]
    fn credit_above_max_is_rejected() {
        let err = load(&[("FAUCET_CREDIT_AMOUNT", "200"), ("FAUCET_MAX_CREDIT", "100")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::CreditAboveMax { .. }));
    }

    #[test]
    fn zero_capacity_and_attempts_are_rejected() {
        assert!(matches!(
            load(&[("FAUCET_QUEUE_CAPACITY", "0")]),
            Err(ConfigError::Zero("queue_capacity"))
        ));
        assert!(matches!(
            load(&[("FAUCET_MAX_ATTEMPTS", "0")]),
            Err(ConfigError::Zero("max_attempts"))
        ));
    }

    #[test]
    fn secret_key_is_redacted() {
        let config = load(&[("FAUCET_KEY", "deadbeef")]).unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("deadbeef"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn retry_settings_from_env() {
        let config = load(&[
            ("FAUCET_MAX_ATTEMPTS", "4"),
            ("FAUCET_INITIAL_BACKOFF_MS", "50"),
            ("FAUCET_MAX_BACKOFF_MS", "1000"),
            ("FAUCET_BACKOFF_MULTIPLIER", "3"),
        ])
        .unwrap();
        let retry = config.retry_policy();
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.multiplier, 3);
        assert_eq!(retry.backoff(3), Duration::from_millis(450));

        assert!(matches!(
            load(&[("FAUCET_BACKOFF_MULTIPLIER", "0")]),
            Err(ConfigError::Zero("backoff_multiplier"))
        ));
    }

    #[test]
    fn deserialize_from_json() {
        let config: FaucetConfig = serde_json::from_str(
            r#"{
                "chain_id": "devnet-7",
                "key_secret": "deadbeef",
                "credit_amount": 10,
                "max_credit": 20,
                "denom_limits": { "stake": { "credit_amount": 5, "max_credit": 50 } }
            }"#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.chain_id, "devnet-7");
        assert_eq!(config.key_secret.as_ref().map(SecretKey::expose), Some("deadbeef"));
        // unset fields keep their defaults
        assert_eq!(config.denom, "atom");
        assert_eq!(config.queue_capacity, 64);

        let policy = config.policy_config().unwrap();
        assert_eq!(
            policy.overrides.get(&Denom::parse("stake").unwrap()),
            Some(&DenomLimit {
                credit_amount: 5,
                max_credit: 50
            })
        );
        assert_eq!(policy.default_coins.to_string(), "10atom");
    }
}
