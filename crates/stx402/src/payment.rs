use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::X402Error;

/// Signed Stacks payment carried inside a [`PaymentPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StacksPaymentData {
    /// Hex-encoded, fully signed STX transfer transaction.
    pub transaction: String,
    /// Sender address as claimed by the client. The facilitator is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// Wire-format payment payload (sent in PAYMENT-SIGNATURE header, base64-encoded JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub payload: StacksPaymentData,
}

/// A single entry in the `accepts` array of a 402 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    /// Price in microSTX, as a decimal string.
    pub amount: String,
    pub asset: String,
    pub pay_to: String,
    /// Public URL of the resource being paid for.
    pub resource: String,
    pub max_timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

/// The 402 response body returned by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    pub x402_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub accepts: Vec<PaymentRequirements>,
    /// Human-readable STX price, trailing zeros trimmed (e.g. "0.5").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_stx: Option<String>,
    /// Approximate USD price derived from the cached STX quote.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<String>,
}

/// Base64-encode a payment payload for the PAYMENT-SIGNATURE header.
pub fn encode_payment(payload: &PaymentPayload) -> Result<String, X402Error> {
    let json = serde_json::to_vec(payload)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

/// Decode a PAYMENT-SIGNATURE header value into a [`PaymentPayload`].
pub fn decode_payment(header: &str) -> Result<PaymentPayload, X402Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(header.trim())
        .map_err(|e| X402Error::InvalidEncoding(e.to_string()))?;
    Ok(serde_json::from_slice(&bytes)?)
}
