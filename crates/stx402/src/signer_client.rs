//! HTTP client for a signing service that turns a payer secret into a
//! signed [`PaymentPayload`] (`POST {base}/sign`).

use std::time::Duration;

use async_trait::async_trait;

use crate::payment::{PaymentPayload, PaymentRequirements};
use crate::scheme::{PaymentSigner, SecretKey, SignerError};

#[derive(Clone)]
pub struct HttpSigner {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for HttpSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSigner")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpSigner {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl PaymentSigner for HttpSigner {
    async fn sign(
        &self,
        requirements: &PaymentRequirements,
        secret: &SecretKey,
    ) -> Result<PaymentPayload, SignerError> {
        let body = serde_json::json!({
            "paymentRequirements": requirements,
            "secretKey": secret.expose(),
        });

        let response = self
            .client
            .post(format!("{}/sign", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SignerError::Unavailable(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SignerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<PaymentPayload>()
            .await
            .map_err(|e| SignerError::InvalidResponse(e.to_string()))
    }
}
