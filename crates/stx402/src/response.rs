use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::X402Error;

/// Response from the facilitator's `/verify` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Response from the facilitator's `/settle` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// Transaction id, if settlement succeeded. `None` on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    pub network: String,
}

/// Envelope carried (base64 JSON) in the `payment-response` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub success: bool,
    pub transaction: String,
    pub payer: String,
    pub network: String,
}

impl PaymentReceipt {
    pub fn to_header_value(&self) -> Result<String, X402Error> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }

    pub fn from_header_value(value: &str) -> Result<Self, X402Error> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(value.trim())
            .map_err(|e| X402Error::InvalidEncoding(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_response_omits_empty_fields() {
        let resp = SettleResponse {
            success: false,
            error_reason: Some("amount mismatch".to_string()),
            payer: None,
            transaction: None,
            network: "testnet".to_string(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["errorReason"], "amount mismatch");
        assert!(json.get("transaction").is_none());
    }

    #[test]
    fn test_receipt_header_is_plain_base64_json() {
        let receipt = PaymentReceipt {
            success: true,
            transaction: "0xfeed".to_string(),
            payer: "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM".to_string(),
            network: "testnet".to_string(),
        };
        let header = receipt.to_header_value().unwrap();
        let raw = base64::engine::general_purpose::STANDARD
            .decode(&header)
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["transaction"], "0xfeed");
        assert_eq!(PaymentReceipt::from_header_value(&header).unwrap(), receipt);
    }
}
