use std::collections::BTreeSet;
use std::env;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use faucet_eng::csv::{OutcomeRow, read_requests, write_outcomes};
use faucet_eng::policy::CreditPolicy;
use faucet_eng::{Coin, Coins, Denom, Engine, FaucetConfig, InMemoryLedger, SigningIdentity};

/// Multiple of the max credit minted into the devnet faucet account per denom.
const DEVNET_FUNDING: u64 = 1_000;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: faucet-eng <requests.csv>");
        return ExitCode::FAILURE;
    };

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    match run(&path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: &str) -> Result<(), Box<dyn Error>> {
    let config = FaucetConfig::from_env()?;

    let identity = match &config.key_secret {
        Some(secret) => SigningIdentity::from_hex(
            &config.key_name,
            secret.expose(),
            &config.chain_id,
            &config.address_prefix,
        )?,
        None => {
            info!("no faucet key configured, using a throwaway key");
            SigningIdentity::generate(&config.key_name, &config.chain_id, &config.address_prefix)?
        }
    };

    let ledger = Arc::new(devnet(&config, &identity)?);
    let (engine, worker) = Engine::start(&config, identity, ledger)?;
    let engine = Arc::new(engine);

    // Keep at most a queue's worth of transfers in flight.
    let permits = Arc::new(Semaphore::new(config.queue_capacity));
    let mut handles = Vec::new();
    for result in read_requests(path)? {
        let request = match result {
            Ok(request) => request,
            Err(e) => {
                warn!("{e}");
                handles.push(tokio::spawn(std::future::ready(OutcomeRow::unreadable(&e))));
                continue;
            }
        };

        let permit = Arc::clone(&permits).acquire_owned().await?;
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let result = engine.transfer(&request).await;
            drop(permit);
            OutcomeRow::new(request.recipient, &result)
        }));
    }

    let mut rows = Vec::with_capacity(handles.len());
    for handle in handles {
        rows.push(handle.await?);
    }

    engine.shutdown();
    let stats = worker.await?;
    info!(
        processed = stats.processed,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "batch finished"
    );

    write_outcomes(std::io::stdout().lock(), rows)?;
    Ok(())
}

/// A local ledger knowing the configured denoms, with the faucet account funded.
fn devnet(
    config: &FaucetConfig,
    identity: &SigningIdentity,
) -> Result<InMemoryLedger, Box<dyn Error>> {
    let policy_config = config.policy_config()?;
    let denoms: BTreeSet<Denom> = policy_config
        .default_coins
        .iter()
        .map(|coin| coin.denom.clone())
        .chain(policy_config.overrides.keys().cloned())
        .collect();

    let policy = CreditPolicy::new(policy_config);
    let funding = denoms
        .iter()
        .map(|denom| {
            let max_credit = policy.limit_for(denom).max_credit;
            Coin::new(max_credit.saturating_mul(DEVNET_FUNDING), denom.clone())
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ledger = InMemoryLedger::new(config.chain_id.clone(), denoms);
    ledger.fund(identity.address(), &Coins::new(funding)?);
    Ok(ledger)
}
