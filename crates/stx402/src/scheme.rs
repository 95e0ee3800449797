//! Collaborator seams for the payment flow.
//!
//! - [`PaymentFacilitator`]: verifies and settles payment payloads
//! - [`PaymentSigner`]: produces a payment payload from a payer-held secret
//!
//! See [`crate::facilitator_client::HttpFacilitator`] and
//! [`crate::signer_client::HttpSigner`] for the HTTP implementations.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::payment::{PaymentPayload, PaymentRequirements};
use crate::response::{SettleResponse, VerifyResponse};

/// Failure talking to the facilitator.
#[derive(Debug, Error)]
pub enum FacilitatorError {
    /// The facilitator answered with a non-success status. Status and body are
    /// kept verbatim so callers can see the real rejection reason.
    #[error("facilitator rejected the payment with status {status}")]
    Rejected { status: u16, body: String },

    /// Timeout or connection failure; no verdict was reached.
    #[error("facilitator unavailable: {0}")]
    Unavailable(String),

    /// The facilitator answered 2xx with a body we could not understand.
    #[error("invalid facilitator response: {0}")]
    InvalidResponse(String),
}

/// Failure producing a self-signed payment.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signer rejected the credential with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("signer unavailable: {0}")]
    Unavailable(String),

    #[error("invalid signer response: {0}")]
    InvalidResponse(String),
}

/// Payer-held secret credential used in self-signed mode.
///
/// `Debug` is redacted and there is no `Serialize` impl; the raw value is
/// only reachable through [`SecretKey::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Facilitator-side capability: verifies and settles payments.
///
/// The gateway only calls [`settle`](Self::settle), which verifies and then
/// broadcasts in one round trip. [`verify`](Self::verify) is the dry-run check
/// for callers that want an answer without moving funds.
#[async_trait]
pub trait PaymentFacilitator: Send + Sync {
    /// Verify a payment payload against the requirements without settling.
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, FacilitatorError>;

    /// Settle a payment (re-verifies first, then broadcasts the transfer).
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, FacilitatorError>;
}

/// Signing capability: turns a payer secret into a payment payload.
#[async_trait]
pub trait PaymentSigner: Send + Sync {
    async fn sign(
        &self,
        requirements: &PaymentRequirements,
        secret: &SecretKey,
    ) -> Result<PaymentPayload, SignerError>;
}
