use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Unknown, inactive or misconfigured endpoint (all render the same 404)
    #[error("endpoint not found: {0}")]
    NotFound(String),

    /// Stored origin URL does not parse
    #[error("invalid target URL: {0}")]
    InvalidConfiguration(String),

    /// Malformed caller input (query string, path)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Caller presented a secret key but self-signed mode is off
    #[error("self-signed payments are disabled")]
    SelfSignDisabled,

    /// Facilitator (or signer) said no. Status and body are relayed verbatim.
    #[error("payment rejected with status {status}")]
    PaymentRejected { status: u16, body: String },

    /// Facilitator timed out or could not be reached
    #[error("facilitator unavailable: {0}")]
    FacilitatorUnavailable(String),

    /// Origin unreachable, timed out, or refused by origin policy
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Store error
    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable identifier used in response bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NotFound(_) => "endpoint_not_found",
            GatewayError::InvalidConfiguration(_) => "invalid_target_url",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::SelfSignDisabled => "self_signed_disabled",
            GatewayError::PaymentRejected { .. } => "payment_rejected",
            GatewayError::FacilitatorUnavailable(_) => "facilitator_unavailable",
            GatewayError::UpstreamUnavailable(_) => "bad_gateway",
            GatewayError::Store(_) | GatewayError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::InvalidConfiguration(_) | GatewayError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::SelfSignDisabled => StatusCode::FORBIDDEN,
            GatewayError::PaymentRejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::PAYMENT_REQUIRED)
            }
            GatewayError::FacilitatorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Store(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            GatewayError::NotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
                "error": self.code(),
                "message": "Endpoint not found"
            })),
            GatewayError::InvalidConfiguration(detail) => {
                tracing::warn!(detail = %detail, "endpoint has an unparseable origin URL");
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": self.code(),
                    "message": "Invalid target URL"
                }))
            }
            GatewayError::InvalidRequest(msg) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": self.code(),
                "message": msg
            })),
            GatewayError::SelfSignDisabled => HttpResponse::Forbidden().json(serde_json::json!({
                "error": self.code(),
                "message": "Self-signed payments are not enabled on this gateway"
            })),
            GatewayError::PaymentRejected { body, .. } => {
                // Body goes out untouched.
                let mut builder = HttpResponse::build(status);
                if serde_json::from_str::<serde_json::Value>(body).is_ok() {
                    builder.content_type("application/json");
                } else {
                    builder.content_type("text/plain; charset=utf-8");
                }
                builder.body(body.clone())
            }
            GatewayError::FacilitatorUnavailable(msg) => {
                tracing::error!("Facilitator unavailable: {}", msg);
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": self.code(),
                    "message": "Payment facilitator is unavailable, try again later"
                }))
            }
            GatewayError::UpstreamUnavailable(msg) => {
                tracing::error!("Upstream error: {}", msg);
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": self.code(),
                    "message": "Bad Gateway"
                }))
            }
            GatewayError::Store(e) => {
                tracing::error!("Database error: {}", e);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": self.code(),
                    "message": "An internal error occurred"
                }))
            }
            GatewayError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": self.code(),
                    "message": "An internal error occurred"
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_keeps_facilitator_status() {
        let err = GatewayError::PaymentRejected {
            status: 422,
            body: "{\"error\":\"amount_mismatch\"}".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::NotFound("a/b/c".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::InvalidConfiguration("nope".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::UpstreamUnavailable("timeout".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::FacilitatorUnavailable("timeout".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
