// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Typed errors for the ingestion, ledger and rate layers.
//!
//! The CLI wraps these in `anyhow` with extra context; the library keeps them
//! typed so callers can tell fatal job failures from recoverable row rejections.

use thiserror::Error;

/// An uploaded file could not be read as a table.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Malformed source: {0}")]
    Malformed(String),

    #[error("Sheet '{0}' not found")]
    MissingSection(String),

    #[error("Unsupported file type '{0}'")]
    Unsupported(String),
}

/// Why a single row was rejected during mapping. Recorded, never thrown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("Invalid date '{0}'")]
    InvalidDate(String),

    #[error("Currency '{row}' does not match asset currency '{asset}'")]
    CurrencyMismatch { row: String, asset: String },

    #[error("Unreadable row: {0}")]
    Unreadable(String),
}

#[derive(Error, Debug)]
pub enum FxError {
    #[error("Exchange rates unavailable for {0}")]
    RatesUnavailable(String),

    #[error("No {to} rate in the {from} table")]
    RateNotFound { from: String, to: String },

    #[error("Rate provider request failed: {0}")]
    Provider(String),

    #[error("Rate provider protocol error: {0}")]
    Protocol(String),

    #[error("Rate cache error: {0}")]
    Store(String),
}

impl From<rusqlite::Error> for FxError {
    fn from(e: rusqlite::Error) -> Self {
        FxError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for FxError {
    fn from(e: serde_json::Error) -> Self {
        FxError::Store(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Asset {0} not found")]
    AssetNotFound(i64),

    #[error("Not allowed to modify asset {0}")]
    Forbidden(i64),

    #[error("Transaction {0} not found")]
    TransactionNotFound(i64),

    #[error("Balance of asset {0} changed concurrently; gave up after retries")]
    PersistenceConflict(i64),

    #[error("Invalid stored value '{value}' in {column}")]
    Corrupt { column: &'static str, value: String },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Fx(#[from] FxError),

    #[error("Database operation failed: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Import {history_id} failed: {cause}")]
    ImportFailed {
        history_id: i64,
        #[source]
        cause: Box<LedgerError>,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
