//! Batch input and output for the faucet binary.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::{ErrorKind, TransferError, TransferOutcome, TransferRequest};

/// Errors that can occur when reading request rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("cannot open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: missing address")]
    MissingAddress { line: usize },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    address: String,
    /// `;` separated coins, e.g. `10atom;5stake`
    coins: Option<String>,
}

/// One output line per request.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct OutcomeRow {
    pub address: String,
    pub status: &'static str,
    pub code: &'static str,
    pub tx_hash: String,
    pub message: String,
}

impl OutcomeRow {
    pub fn new(address: impl Into<String>, result: &Result<TransferOutcome, TransferError>) -> Self {
        let address = address.into();
        match result {
            Ok(TransferOutcome::Success(receipt)) => Self {
                address,
                status: "ok",
                code: "",
                tx_hash: receipt.tx_hash.clone(),
                message: String::new(),
            },
            Ok(TransferOutcome::Failure { kind, message }) => Self {
                address,
                status: "failed",
                code: kind.error_kind().code(),
                tx_hash: String::new(),
                message: message.clone(),
            },
            Err(e) => Self {
                address,
                status: "rejected",
                code: e.kind().code(),
                tx_hash: String::new(),
                message: e.to_string(),
            },
        }
    }

    /// Row standing in for an input line that could not be read.
    pub fn unreadable(error: &CsvError) -> Self {
        Self {
            address: String::new(),
            status: "rejected",
            code: ErrorKind::InvalidInput.code(),
            tx_hash: String::new(),
            message: error.to_string(),
        }
    }
}

/// Read transfer requests from a csv file with an `address,coins` header
pub fn read_requests(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<TransferRequest, CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            if row.address.is_empty() {
                return Err(CsvError::MissingAddress { line });
            }
            let coins = row
                .coins
                .unwrap_or_default()
                .split(';')
                .map(str::trim)
                .filter(|coin| !coin.is_empty())
                .map(String::from)
                .collect();
            Ok(TransferRequest::new(row.address, coins))
        }))
}

/// Write outcome rows in csv format
pub fn write_outcomes<W: io::Write>(
    writer: W,
    rows: impl IntoIterator<Item = OutcomeRow>,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(&row)?;
    }
    writer.flush()?;
    Ok(())
}
