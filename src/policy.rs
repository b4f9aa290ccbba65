//! Credit policy: decides which coins a request actually receives.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::coin::{Coin, CoinError, Coins, Denom};
use crate::model::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error(transparent)]
    InvalidCoin(#[from] CoinError),

    #[error("requested {requested}{denom} exceeds the maximum credit of {max_credit}{denom}")]
    OverLimit {
        denom: Denom,
        requested: u64,
        max_credit: u64,
    },
}

impl PolicyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PolicyError::InvalidCoin(_) => ErrorKind::InvalidInput,
            PolicyError::OverLimit { .. } => ErrorKind::PolicyRejected,
        }
    }
}

/// Limits for one denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DenomLimit {
    /// Amount handed out per request.
    pub credit_amount: u64,
    /// Requests above this amount are rejected outright.
    pub max_credit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditPolicyConfig {
    pub default_coins: Coins,
    pub credit_amount: u64,
    pub max_credit: u64,
    pub overrides: BTreeMap<Denom, DenomLimit>,
    pub clamp_to_credit: bool,
}

/// Stateless credit policy; share it freely between callers.
#[derive(Debug, Clone)]
pub struct CreditPolicy {
    config: CreditPolicyConfig,
}

impl CreditPolicy {
    pub fn new(config: CreditPolicyConfig) -> Self {
        Self { config }
    }

    pub fn default_coins(&self) -> &Coins {
        &self.config.default_coins
    }

    /// Limits applying to `denom`.
    pub fn limit_for(&self, denom: &Denom) -> DenomLimit {
        self.config
            .overrides
            .get(denom)
            .copied()
            .unwrap_or(DenomLimit {
                credit_amount: self.config.credit_amount,
                max_credit: self.config.max_credit,
            })
    }

    /// Turn requested `"<amount><denom>"` strings into the coins to dispense.
    ///
    /// - no coins requested: the default coin set
    /// - any amount above its max credit: [`PolicyError::OverLimit`]
    /// - otherwise each amount is lowered to its credit amount, unless
    ///   clamping is disabled
    pub fn approve<S: AsRef<str>>(&self, requested: &[S]) -> Result<Coins, PolicyError> {
        if requested.is_empty() {
            return Ok(self.config.default_coins.clone());
        }

        let mut approved = Vec::with_capacity(requested.len());
        for raw in requested {
            let coin: Coin = raw.as_ref().parse()?;
            let limit = self.limit_for(&coin.denom);

            if coin.amount > limit.max_credit {
                return Err(PolicyError::OverLimit {
                    denom: coin.denom,
                    requested: coin.amount,
                    max_credit: limit.max_credit,
                });
            }

            let amount = if self.config.clamp_to_credit {
                coin.amount.min(limit.credit_amount)
            } else {
                coin.amount
            };
            approved.push(Coin::new(amount, coin.denom)?);
        }

        Ok(Coins::new(approved)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denom(s: &str) -> Denom {
        Denom::parse(s).unwrap()
    }

    fn policy(clamp_to_credit: bool) -> CreditPolicy {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            denom("stake"),
            DenomLimit {
                credit_amount: 5,
                max_credit: 50,
            },
        );
        CreditPolicy::new(CreditPolicyConfig {
            default_coins: "100atom,5stake".parse().unwrap(),
            credit_amount: 100,
            max_credit: 1_000,
            overrides,
            clamp_to_credit,
        })
    }

    #[test]
    fn empty_request_returns_default_coins_verbatim() {
        let policy = policy(true);
        let approved = policy.approve::<&str>(&[]).unwrap();
        assert_eq!(&approved, policy.default_coins());
    }

    #[test]
    fn small_request_passes_unchanged() {
        let approved = policy(true).approve(&["40atom"]).unwrap();
        assert_eq!(approved.to_string(), "40atom");
    }

    #[test]
    fn request_is_clamped_to_credit_amount() {
        let approved = policy(true).approve(&["900atom", "30stake"]).unwrap();
        assert_eq!(approved.to_string(), "100atom,5stake");
    }

    #[test]
    fn clamping_can_be_disabled() {
        let approved = policy(false).approve(&["900atom"]).unwrap();
        assert_eq!(approved.to_string(), "900atom");
    }

    #[test]
    fn amount_at_max_credit_is_allowed() {
        assert!(policy(false).approve(&["1000atom"]).is_ok());
    }

    #[test]
    fn amount_above_max_credit_is_rejected() {
        let err = policy(true).approve(&["1001atom"]).unwrap_err();
        assert_eq!(
            err,
            PolicyError::OverLimit {
                denom: denom("atom"),
                requested: 1001,
                max_credit: 1_000,
            }
        );
        assert_eq!(err.kind(), ErrorKind::PolicyRejected);
    }

    #[test]
    fn override_max_credit_applies_per_denom() {
        let err = policy(true).approve(&["10atom", "51stake"]).unwrap_err();
        assert!(matches!(err, PolicyError::OverLimit { max_credit: 50, .. }));
    }

    #[test]
    fn invalid_denom_is_invalid_input() {
        let err = policy(true).approve(&["10a"]).unwrap_err();
        assert_eq!(
            err,
            PolicyError::InvalidCoin(CoinError::InvalidDenom("a".to_string()))
        );
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn duplicate_denom_is_invalid_input() {
        let err = policy(true).approve(&["10atom", "20atom"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
