//! Payment gate: the 402 challenge / verify cycle in front of every paid call.
//!
//! One state machine, parameterised by [`PaymentMode`]:
//!
//! - no proof, no credential: answer with a 402 challenge
//! - `payment-signature` header: settle the caller's signed payload
//! - `x-payer-key` header or `payerKey` query parameter: have the signer
//!   produce a payload from the caller's secret, then settle it exactly like
//!   a caller-signed one
//!
//! Only a settled payment lets the request through to the forwarder.

use actix_web::{HttpRequest, HttpResponse};
use x402::{
    decode_payment, format_micro_stx, FacilitatorError, PaymentPayload, PaymentRequiredBody,
    PaymentRequirements, SecretKey, SignerError, StacksNetwork, DEFAULT_MAX_TIMEOUT_SECONDS,
    PAYMENT_SIGNATURE_HEADER, SCHEME_NAME, STX_ASSET, X402_VERSION,
};

use crate::error::GatewayError;
use crate::metrics::{CHALLENGES_ISSUED, PAYMENTS_TOTAL, PAYMENT_FAILURES};
use crate::price_cache::PriceQuoteCache;
use crate::resolver::EndpointConfig;
use crate::state::AppState;

/// Header carrying a payer secret for self-signed payments.
pub const PAYER_KEY_HEADER: &str = "x-payer-key";

/// Query parameter carrying a payer secret for self-signed payments.
pub const PAYER_KEY_PARAM: &str = "payerKey";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    Challenge,
    Verify,
    SelfSigned,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Challenge => "challenge",
            PaymentMode::Verify => "verified",
            PaymentMode::SelfSigned => "self_signed",
        }
    }
}

/// What the caller brought along.
#[derive(Debug)]
pub enum PaymentCredential {
    Signature(String),
    PayerKey(SecretKey),
}

impl PaymentCredential {
    pub fn mode(&self) -> PaymentMode {
        match self {
            PaymentCredential::Signature(_) => PaymentMode::Verify,
            PaymentCredential::PayerKey(_) => PaymentMode::SelfSigned,
        }
    }
}

/// A settled payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentProof {
    pub payer: String,
    pub transaction: String,
    pub network: String,
    pub mode: PaymentMode,
}

pub enum GateOutcome {
    Confirmed(PaymentProof),
    /// Short-circuit with this response (a 402 challenge).
    Respond(HttpResponse),
}

/// Requirements for one call to `endpoint`, regenerated per request.
pub fn build_requirements(
    network: StacksNetwork,
    endpoint: &EndpointConfig,
    resource: &str,
    method: &str,
) -> PaymentRequirements {
    PaymentRequirements {
        scheme: SCHEME_NAME.to_string(),
        network: network.as_str().to_string(),
        amount: endpoint.price_micro_stx.to_string(),
        asset: STX_ASSET.to_string(),
        pay_to: endpoint.payee_address.clone(),
        resource: resource.to_string(),
        max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
        description: endpoint.description.clone(),
        mime_type: Some("application/json".to_string()),
        output_schema: Some(serde_json::json!({
            "input": {
                "type": "http",
                "method": method,
                "discoverable": true
            }
        })),
    }
}

/// Body of every 402 this gateway sends.
pub async fn payment_required_body(
    price_cache: &PriceQuoteCache,
    price_micro_stx: u64,
    requirements: PaymentRequirements,
    error: &str,
) -> PaymentRequiredBody {
    PaymentRequiredBody {
        x402_version: X402_VERSION,
        error: Some(error.to_string()),
        accepts: vec![requirements],
        price_stx: Some(format_micro_stx(price_micro_stx)),
        price_usd: price_cache.usd_price(price_micro_stx).await,
    }
}

pub async fn payment_required_response(
    price_cache: &PriceQuoteCache,
    price_micro_stx: u64,
    requirements: PaymentRequirements,
    error: &str,
) -> HttpResponse {
    let body = payment_required_body(price_cache, price_micro_stx, requirements, error).await;
    HttpResponse::PaymentRequired().json(body)
}

/// Pick the credential the caller presented, if any. A payment signature wins
/// over a payer key; the header wins over the query parameter.
pub fn extract_credential(req: &HttpRequest) -> Option<PaymentCredential> {
    if let Some(value) = req.headers().get(PAYMENT_SIGNATURE_HEADER) {
        let raw = value.to_str().unwrap_or_default().to_string();
        return Some(PaymentCredential::Signature(raw));
    }

    let header_key = req
        .headers()
        .get(PAYER_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let key = header_key.or_else(|| {
        let query = req.uri().query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, v)| k == PAYER_KEY_PARAM && !v.is_empty())
            .map(|(_, v)| v.into_owned())
    });

    key.map(|k| PaymentCredential::PayerKey(SecretKey::new(k)))
}

/// Run the gate for one request.
pub async fn process_payment(
    state: &AppState,
    req: &HttpRequest,
    endpoint: &EndpointConfig,
    requirements: &PaymentRequirements,
) -> Result<GateOutcome, GatewayError> {
    let credential = match extract_credential(req) {
        Some(c) => c,
        None => {
            tracing::debug!(payment_mode = PaymentMode::Challenge.as_str(), "no payment presented");
            CHALLENGES_ISSUED.inc();
            let response = payment_required_response(
                &state.price_cache,
                endpoint.price_micro_stx,
                requirements.clone(),
                "payment_required",
            )
            .await;
            return Ok(GateOutcome::Respond(response));
        }
    };

    let mode = credential.mode();
    let payload = match credential {
        PaymentCredential::Signature(raw) => match decode_payment(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "undecodable payment-signature header");
                PAYMENT_FAILURES
                    .with_label_values(&["invalid_payment_header"])
                    .inc();
                let response = payment_required_response(
                    &state.price_cache,
                    endpoint.price_micro_stx,
                    requirements.clone(),
                    "invalid_payment_header",
                )
                .await;
                return Ok(GateOutcome::Respond(response));
            }
        },
        PaymentCredential::PayerKey(secret) => sign_on_behalf(state, requirements, &secret).await?,
    };

    settle(state, endpoint, requirements, &payload, mode).await
}

async fn sign_on_behalf(
    state: &AppState,
    requirements: &PaymentRequirements,
    secret: &SecretKey,
) -> Result<PaymentPayload, GatewayError> {
    let signer = match (&state.signer, state.config.allow_self_signed) {
        (Some(signer), true) => signer,
        _ => {
            PAYMENT_FAILURES
                .with_label_values(&["self_signed_disabled"])
                .inc();
            return Err(GatewayError::SelfSignDisabled);
        }
    };

    signer.sign(requirements, secret).await.map_err(|e| {
        PAYMENT_FAILURES.with_label_values(&["signer_error"]).inc();
        match e {
            SignerError::Rejected { status, body } => {
                tracing::warn!(status, "signer rejected the payer credential");
                GatewayError::PaymentRejected { status, body }
            }
            SignerError::Unavailable(msg) | SignerError::InvalidResponse(msg) => {
                GatewayError::FacilitatorUnavailable(format!("signer: {msg}"))
            }
        }
    })
}

async fn settle(
    state: &AppState,
    endpoint: &EndpointConfig,
    requirements: &PaymentRequirements,
    payload: &PaymentPayload,
    mode: PaymentMode,
) -> Result<GateOutcome, GatewayError> {
    let settlement = match state.facilitator.settle(payload, requirements).await {
        Ok(s) => s,
        Err(FacilitatorError::Rejected { status, body }) => {
            tracing::warn!(status, payment_mode = mode.as_str(), "facilitator rejected payment");
            PAYMENT_FAILURES.with_label_values(&["rejected"]).inc();
            return Err(GatewayError::PaymentRejected { status, body });
        }
        Err(e @ (FacilitatorError::Unavailable(_) | FacilitatorError::InvalidResponse(_))) => {
            PAYMENT_FAILURES.with_label_values(&["facilitator_unavailable"]).inc();
            return Err(GatewayError::FacilitatorUnavailable(e.to_string()));
        }
    };

    if !settlement.success {
        let reason = settlement
            .error_reason
            .unwrap_or_else(|| "settlement_failed".to_string());
        tracing::info!(reason = %reason, payment_mode = mode.as_str(), "payment not settled");
        PAYMENT_FAILURES.with_label_values(&["settlement_failed"]).inc();
        let response = payment_required_response(
            &state.price_cache,
            endpoint.price_micro_stx,
            requirements.clone(),
            &reason,
        )
        .await;
        return Ok(GateOutcome::Respond(response));
    }

    let transaction = settlement
        .transaction
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            PAYMENT_FAILURES.with_label_values(&["facilitator_unavailable"]).inc();
            GatewayError::FacilitatorUnavailable(
                "settlement response carried no transaction reference".to_string(),
            )
        })?;

    let payer = settlement
        .payer
        .or_else(|| payload.payload.from.clone())
        .unwrap_or_else(|| "unknown".to_string());

    PAYMENTS_TOTAL.with_label_values(&[mode.as_str()]).inc();
    tracing::info!(
        tx = %transaction,
        payer = %payer,
        payment_mode = mode.as_str(),
        explorer = %state.config.network.explorer_tx_url(&transaction),
        "payment settled"
    );

    Ok(GateOutcome::Confirmed(PaymentProof {
        payer,
        transaction,
        network: settlement.network,
        mode,
    }))
}
