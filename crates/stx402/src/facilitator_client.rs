//! HTTP client for a remote facilitator's `/verify` and `/settle` endpoints.
//!
//! Every call carries an explicit timeout. Transport failures map to
//! [`FacilitatorError::Unavailable`]; non-2xx answers are kept verbatim in
//! [`FacilitatorError::Rejected`].

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::constants::X402_VERSION;
use crate::hmac::{compute_hmac, FACILITATOR_AUTH_HEADER};
use crate::payment::{PaymentPayload, PaymentRequirements};
use crate::response::{SettleResponse, VerifyResponse};
use crate::scheme::{FacilitatorError, PaymentFacilitator};

/// Default bound on a single facilitator round trip.
pub const DEFAULT_FACILITATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`PaymentFacilitator`] reached over HTTP.
#[derive(Clone)]
pub struct HttpFacilitator {
    client: reqwest::Client,
    base_url: String,
    hmac_secret: Option<Vec<u8>>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpFacilitator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFacilitator")
            .field("base_url", &self.base_url)
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpFacilitator {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            hmac_secret: None,
            timeout: DEFAULT_FACILITATOR_TIMEOUT,
        }
    }

    /// Sign every request body with HMAC-SHA256 in `X-Facilitator-Auth`.
    pub fn with_hmac_secret(mut self, secret: Option<Vec<u8>>) -> Self {
        self.hmac_secret = secret;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<R: DeserializeOwned>(
        &self,
        route: &'static str,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<R, FacilitatorError> {
        let url = format!("{}{}", self.base_url, route);
        let body = serde_json::json!({
            "x402Version": X402_VERSION,
            "paymentPayload": payload,
            "paymentRequirements": requirements,
        });
        let body_bytes = serde_json::to_vec(&body)
            .map_err(|e| FacilitatorError::InvalidResponse(format!("serialization failed: {e}")))?;

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout);

        if let Some(ref secret) = self.hmac_secret {
            request = request.header(FACILITATOR_AUTH_HEADER, compute_hmac(secret, &body_bytes));
        }

        let response = request.body(body_bytes).send().await.map_err(|e| {
            tracing::warn!(route, error = %e, timeout = e.is_timeout(), "facilitator request failed");
            FacilitatorError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            FacilitatorError::Unavailable(format!("failed to read facilitator response: {e}"))
        })?;

        if !status.is_success() {
            tracing::warn!(route, status = %status, "facilitator returned non-success response");
            return Err(FacilitatorError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| FacilitatorError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentFacilitator for HttpFacilitator {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, FacilitatorError> {
        self.post_json("/verify", payload, requirements).await
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, FacilitatorError> {
        self.post_json("/settle", payload, requirements).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::StacksPaymentData;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: 1,
            scheme: "exact".to_string(),
            network: "testnet".to_string(),
            payload: StacksPaymentData {
                transaction: "0x00".to_string(),
                from: None,
            },
        }
    }

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: "testnet".to_string(),
            amount: "1000".to_string(),
            asset: "STX".to_string(),
            pay_to: "ST2CY5V39NHDPWSXMW9QDT3HC3GD6Q6XX4CFRK9AG".to_string(),
            resource: "https://gw.example/a/b/c".to_string(),
            max_timeout_seconds: 300,
            description: None,
            mime_type: None,
            output_schema: None,
        }
    }

    #[tokio::test]
    async fn test_settle_success_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .and(header_exists("X-Facilitator-Auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "payer": "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM",
                "transaction": "0xabc",
                "network": "testnet",
            })))
            .mount(&server)
            .await;

        let facilitator = HttpFacilitator::new(reqwest::Client::new(), server.uri())
            .with_hmac_secret(Some(b"secret".to_vec()));
        let settle = facilitator.settle(&payload(), &requirements()).await.unwrap();
        assert!(settle.success);
        assert_eq!(settle.transaction.as_deref(), Some("0xabc"));
    }

    #[tokio::test]
    async fn test_verify_posts_to_verify_route() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "isValid": false,
                "invalidReason": "insufficient_funds",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let facilitator = HttpFacilitator::new(reqwest::Client::new(), server.uri());
        let verify = facilitator.verify(&payload(), &requirements()).await.unwrap();
        assert!(!verify.is_valid);
        assert_eq!(verify.invalid_reason.as_deref(), Some("insufficient_funds"));
    }

    #[tokio::test]
    async fn test_rejection_is_kept_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("{\"error\":\"amount_mismatch\"}"),
            )
            .mount(&server)
            .await;

        let facilitator = HttpFacilitator::new(reqwest::Client::new(), server.uri());
        match facilitator.settle(&payload(), &requirements()).await {
            Err(FacilitatorError::Rejected { status, body }) => {
                assert_eq!(status, 422);
                assert_eq!(body, "{\"error\":\"amount_mismatch\"}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let facilitator = HttpFacilitator::new(reqwest::Client::new(), server.uri())
            .with_timeout(Duration::from_millis(200));
        let result = facilitator.verify(&payload(), &requirements()).await;
        assert!(matches!(result, Err(FacilitatorError::Unavailable(_))));
    }
}
