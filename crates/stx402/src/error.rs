use thiserror::Error;

/// Errors returned by x402 protocol operations.
#[derive(Debug, Error)]
pub enum X402Error {
    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid header encoding: {0}")]
    InvalidEncoding(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
