//! Coin value types: denominations, single coins and ordered coin sets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing denominations and coins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoinError {
    #[error("invalid denomination '{0}'")]
    InvalidDenom(String),

    #[error("invalid amount in '{0}'")]
    InvalidAmount(String),

    #[error("duplicate denomination '{0}'")]
    DuplicateDenom(String),
}

/// A ledger denomination, e.g. `atom` or `ibc/27394F`.
///
/// Must match `[a-zA-Z][a-zA-Z0-9/:._-]{2,127}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Denom(String);

impl Denom {
    const MIN_LEN: usize = 3;
    const MAX_LEN: usize = 128;

    pub fn parse(value: &str) -> Result<Self, CoinError> {
        let mut chars = value.chars();
        let valid_len = (Self::MIN_LEN..=Self::MAX_LEN).contains(&value.len());
        let valid_head = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        let valid_tail =
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'));

        if valid_len && valid_head && valid_tail {
            Ok(Denom(value.to_string()))
        } else {
            Err(CoinError::InvalidDenom(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Denom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Denom {
    type Err = CoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Denom::parse(s)
    }
}

impl TryFrom<String> for Denom {
    type Error = CoinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Denom::parse(&value)
    }
}

impl From<Denom> for String {
    fn from(denom: Denom) -> Self {
        denom.0
    }
}

/// A positive amount of a single denomination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: Denom,
    pub amount: u64,
}

impl Coin {
    pub fn new(amount: u64, denom: Denom) -> Result<Self, CoinError> {
        if amount == 0 {
            return Err(CoinError::InvalidAmount(format!("{amount}{denom}")));
        }
        Ok(Coin { denom, amount })
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Parses `"<amount><denom>"`, e.g. `"10000atom"`. Surrounding whitespace is ignored.
impl FromStr for Coin {
    type Err = CoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (digits, denom) = raw.split_at(split);

        if digits.is_empty() {
            return Err(CoinError::InvalidAmount(raw.to_string()));
        }
        let amount = digits
            .parse::<u64>()
            .map_err(|_| CoinError::InvalidAmount(raw.to_string()))?;
        let denom = Denom::parse(denom.trim_start())?;

        Coin::new(amount, denom)
    }
}

/// A set of coins ordered by denomination, at most one coin per denomination.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coin>", into = "Vec<Coin>")]
pub struct Coins(Vec<Coin>);

impl Coins {
    pub fn new(mut coins: Vec<Coin>) -> Result<Self, CoinError> {
        coins.sort_by(|a, b| a.denom.cmp(&b.denom));
        if let Some(pair) = coins.windows(2).find(|pair| pair[0].denom == pair[1].denom) {
            return Err(CoinError::DuplicateDenom(pair[0].denom.to_string()));
        }
        Ok(Coins(coins))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> + '_ {
        self.0.iter()
    }

    pub fn amount_of(&self, denom: &Denom) -> u64 {
        self.0
            .iter()
            .find(|coin| &coin.denom == denom)
            .map_or(0, |coin| coin.amount)
    }
}

/// Parses a comma separated list, e.g. `"10atom,5stake"`.
impl FromStr for Coins {
    type Err = CoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let coins = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Coin::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Coins::new(coins)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, coin) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{coin}")?;
        }
        Ok(())
    }
}

impl TryFrom<Vec<Coin>> for Coins {
    type Error = CoinError;

    fn try_from(value: Vec<Coin>) -> Result<Self, Self::Error> {
        Coins::new(value)
    }
}

impl From<Coins> for Vec<Coin> {
    fn from(coins: Coins) -> Self {
        coins.0
    }
}

impl<'a> IntoIterator for &'a Coins {
    type Item = &'a Coin;
    type IntoIter = std::slice::Iter<'a, Coin>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denom(s: &str) -> Denom {
        Denom::parse(s).unwrap()
    }

    #[test]
    fn denom_accepts_ledger_syntax() {
        assert!(Denom::parse("atom").is_ok());
        assert!(Denom::parse("ibc/27394FB092D2ECCD").is_ok());
        assert!(Denom::parse("factory:pool.lp_1-x").is_ok());
    }

    #[test]
    fn denom_rejects_bad_syntax() {
        assert!(Denom::parse("").is_err());
        assert!(Denom::parse("ab").is_err());
        assert!(Denom::parse("1atom").is_err());
        assert!(Denom::parse("at om").is_err());
        assert!(Denom::parse(&"a".repeat(129)).is_err());
    }

    #[test]
    fn parse_coin() {
        let coin: Coin = "10000atom".parse().unwrap();
        assert_eq!(coin.amount, 10_000);
        assert_eq!(coin.denom, denom("atom"));
    }

    #[test]
    fn parse_coin_trims_whitespace() {
        let coin: Coin = "  5 stake ".parse().unwrap();
        assert_eq!(coin.amount, 5);
        assert_eq!(coin.denom, denom("stake"));
    }

    #[test]
    fn parse_coin_rejects_missing_amount() {
        assert_eq!(
            "atom".parse::<Coin>(),
            Err(CoinError::InvalidAmount("atom".to_string()))
        );
    }

    #[test]
    fn parse_coin_rejects_zero_amount() {
        assert!(matches!(
            "0atom".parse::<Coin>(),
            Err(CoinError::InvalidAmount(_))
        ));
    }

    #[test]
    fn parse_coin_rejects_overflow() {
        assert!(matches!(
            "99999999999999999999999atom".parse::<Coin>(),
            Err(CoinError::InvalidAmount(_))
        ));
    }

    #[test]
    fn parse_coin_rejects_decimal() {
        assert!(matches!(
            "1.5atom".parse::<Coin>(),
            Err(CoinError::InvalidDenom(_))
        ));
    }

    #[test]
    fn coins_are_sorted_by_denom() {
        let coins: Coins = "5stake,10atom".parse().unwrap();
        assert_eq!(coins.to_string(), "10atom,5stake");
    }

    #[test]
    fn coins_reject_duplicate_denom() {
        assert_eq!(
            "5atom,10atom".parse::<Coins>(),
            Err(CoinError::DuplicateDenom("atom".to_string()))
        );
    }

    #[test]
    fn coins_amount_of() {
        let coins: Coins = "5stake,10atom".parse().unwrap();
        assert_eq!(coins.amount_of(&denom("atom")), 10);
        assert_eq!(coins.amount_of(&denom("uosmo")), 0);
    }
}
