//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Wire encoding error: {0}")]
    Wire(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Signing cancelled by user")]
    UserCancelled,

    #[error("Wallet rejected payload encoding: {0}")]
    WalletFormatMismatch(String),

    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("Insufficient balance: have {have} microAlgos, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    #[error("Transaction not confirmed within {rounds} rounds")]
    ConfirmationTimeout { rounds: u64 },

    #[error("Transaction rejected by pool: {0}")]
    PoolRejected(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
