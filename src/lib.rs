pub mod address;
pub mod coin;
pub mod config;
pub mod csv;
pub mod engine;
pub mod identity;
pub mod ledger;
pub mod model;
pub mod policy;
pub mod tx;

pub use address::{Address, AddressError};
pub use coin::{Coin, CoinError, Coins, Denom};
pub use config::FaucetConfig;
pub use engine::{Engine, TransferError};
pub use identity::SigningIdentity;
pub use ledger::{BroadcastError, InMemoryLedger, LedgerClient};
pub use model::{ErrorKind, FailureKind, FaucetInfo, TransferOutcome, TransferReceipt, TransferRequest};
