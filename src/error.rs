use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WifiManagerError {
    #[error("Failed to read ledger file '{path}': {reason}")]
    LedgerRead { path: PathBuf, reason: String },

    #[error("Failed to write ledger file '{path}': {reason}")]
    LedgerWrite { path: PathBuf, reason: String },

    #[error("Failed to parse ledger file '{path}': {reason}")]
    LedgerParse { path: PathBuf, reason: String },

    #[error("Failed to load settings from '{path}': {reason}")]
    Settings { path: PathBuf, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Background task failed: {0}")]
    Task(String),
}
