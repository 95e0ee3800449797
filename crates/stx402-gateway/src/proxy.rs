use std::time::Instant;

use actix_web::http::header::HeaderValue;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use bytes::Bytes;
use url::Url;
use x402::{PaymentReceipt, PAYMENT_RESPONSE_HEADER};

use crate::error::GatewayError;
use crate::gate::{PaymentProof, PAYER_KEY_PARAM};
use crate::metrics::{PROXY_LATENCY, UPSTREAM_FAILURES};
use crate::state::AppState;

/// Headers never forwarded from the caller to the origin
const HEADERS_TO_STRIP: &[&str] = &[
    "host",
    "payment-signature",
    "x-payer-key",
    "content-length", // recomputed from the forwarded body
    // hop-by-hop
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-connection",
];

/// Origin response headers the gateway does not relay. CORS is owned by the
/// gateway's own middleware; framing headers are recomputed for the stream.
const RESPONSE_HEADERS_TO_DROP: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-connection",
    "content-length",
    "payment-response",
    "access-control-allow-origin",
    "access-control-allow-credentials",
    "access-control-allow-headers",
    "access-control-allow-methods",
    "access-control-expose-headers",
    "access-control-max-age",
];

/// Sanitize a query string to prevent CRLF injection and fragment smuggling.
fn sanitize_query(query: &str) -> Result<String, GatewayError> {
    if query.contains('\r') || query.contains('\n') {
        return Err(GatewayError::InvalidRequest(
            "query string must not contain newlines".to_string(),
        ));
    }

    // fragments are never sent to the server
    let sanitized = match query.find('#') {
        Some(idx) => &query[..idx],
        None => query,
    };

    if sanitized.contains('\0') {
        return Err(GatewayError::InvalidRequest(
            "query string must not contain null bytes".to_string(),
        ));
    }

    // check both the raw and the percent-decoded form
    let decoded = urlencoding::decode(sanitized).unwrap_or(std::borrow::Cow::Borrowed(sanitized));
    if decoded.contains("..") || decoded.contains('\r') || decoded.contains('\n') || decoded.contains('\0') {
        return Err(GatewayError::InvalidRequest(
            "query string must not contain path traversal or control sequences".to_string(),
        ));
    }

    Ok(sanitized.to_string())
}

/// Origin URL plus the caller's query parameters, minus the payer key.
///
/// The origin URL is used as stored (its own path and query are kept); an
/// origin that does not parse is a configuration error on the endpoint.
pub fn build_target_url(origin_url: &str, caller_query: Option<&str>) -> Result<Url, GatewayError> {
    let mut target = Url::parse(origin_url)
        .map_err(|e| GatewayError::InvalidConfiguration(format!("{origin_url}: {e}")))?;

    if !matches!(target.scheme(), "http" | "https") || target.host().is_none() {
        return Err(GatewayError::InvalidConfiguration(format!(
            "{origin_url}: not an http(s) URL"
        )));
    }

    let Some(query) = caller_query else {
        return Ok(target);
    };
    let query = sanitize_query(query)?;

    let forwarded: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| k != PAYER_KEY_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if !forwarded.is_empty() {
        target.query_pairs_mut().extend_pairs(forwarded);
    }

    Ok(target)
}

/// Body to send upstream. JSON payloads are re-serialized; anything else is
/// passed through untouched.
fn prepare_body(req: &HttpRequest, body: Bytes) -> (Bytes, bool) {
    if body.is_empty() {
        return (body, false);
    }

    let declared_json = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);

    if declared_json {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body) {
            if let Ok(reencoded) = serde_json::to_vec(&value) {
                return (Bytes::from(reencoded), true);
            }
        }
    }

    (body, false)
}

/// Relay a paid request to `target` and stream the origin's answer back.
///
/// The `payment-response` receipt is set on the response head before any body
/// bytes go out. The outcome is queued on the ledger once the origin status is
/// known; connect failures and timeouts come back as 502 and leave the ledger
/// row without a status.
pub async fn forward(
    state: &AppState,
    req: &HttpRequest,
    body: Bytes,
    target: Url,
    proof: &PaymentProof,
    confirmed_at: Instant,
) -> Result<HttpResponse, GatewayError> {
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| GatewayError::InvalidRequest(format!("unsupported method {}", req.method())))?;

    let mut request_builder = state
        .http_client
        .request(method, target.as_str())
        .timeout(state.config.upstream_timeout);

    let (body, is_json) = prepare_body(req, body);

    for (name, value) in req.headers() {
        let name_lower = name.as_str().to_ascii_lowercase();
        if HEADERS_TO_STRIP.contains(&name_lower.as_str()) {
            continue;
        }
        // Re-serialized JSON gets a single canonical content type below.
        if is_json && name_lower == "content-type" {
            continue;
        }
        request_builder = request_builder.header(name.as_str(), value.as_bytes());
    }

    if is_json {
        request_builder = request_builder.header("content-type", "application/json");
    }
    if !body.is_empty() {
        request_builder = request_builder.body(body);
    }

    let started = Instant::now();
    let response = request_builder.send().await.map_err(|e| {
        UPSTREAM_FAILURES.inc();
        let kind = if e.is_timeout() { "timeout" } else { "connect" };
        tracing::warn!(
            tx = %proof.transaction,
            kind,
            error = %e.without_url(),
            "origin request failed"
        );
        GatewayError::UpstreamUnavailable(format!("origin {kind} failure"))
    })?;
    PROXY_LATENCY.observe(started.elapsed().as_secs_f64());

    let status = response.status();
    state
        .ledger
        .record_outcome(&proof.transaction, status.as_u16(), confirmed_at.elapsed());

    let mut builder = HttpResponse::build(
        StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
    );

    for (name, value) in response.headers() {
        let name_lower = name.as_str().to_ascii_lowercase();
        if RESPONSE_HEADERS_TO_DROP.contains(&name_lower.as_str()) {
            continue;
        }
        if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
            builder.append_header((name.as_str(), value));
        }
    }

    let receipt = PaymentReceipt {
        success: true,
        transaction: proof.transaction.clone(),
        payer: proof.payer.clone(),
        network: proof.network.clone(),
    };
    let receipt_header = receipt
        .to_header_value()
        .map_err(|e| GatewayError::Internal(format!("failed to encode payment receipt: {e}")))?;
    builder.insert_header((PAYMENT_RESPONSE_HEADER, receipt_header));

    tracing::info!(
        tx = %proof.transaction,
        status = status.as_u16(),
        payment_mode = proof.mode.as_str(),
        "forwarded paid request"
    );

    Ok(builder.streaming(response.bytes_stream()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_headers_to_strip() {
        assert!(HEADERS_TO_STRIP.contains(&"host"));
        assert!(HEADERS_TO_STRIP.contains(&"payment-signature"));
        assert!(HEADERS_TO_STRIP.contains(&"x-payer-key"));
        assert!(!HEADERS_TO_STRIP.contains(&"content-type"));
        assert!(!HEADERS_TO_STRIP.contains(&"authorization"));
    }

    #[test]
    fn test_response_headers_to_drop() {
        assert!(RESPONSE_HEADERS_TO_DROP.contains(&"access-control-allow-origin"));
        assert!(RESPONSE_HEADERS_TO_DROP.contains(&"transfer-encoding"));
        assert!(!RESPONSE_HEADERS_TO_DROP.contains(&"content-type"));
        assert!(!RESPONSE_HEADERS_TO_DROP.contains(&"cache-control"));
    }

    #[test]
    fn test_target_keeps_origin_query_and_appends_caller_params() {
        let url = build_target_url(
            "https://api.weather.example/v1/forecast?units=metric",
            Some("city=nyc&payerKey=secret"),
        )
        .unwrap();
        assert_eq!(url.path(), "/v1/forecast");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("units".to_string(), "metric".to_string()),
                ("city".to_string(), "nyc".to_string()),
            ]
        );
    }

    #[test]
    fn test_payer_key_only_query_leaves_origin_untouched() {
        let url = build_target_url("https://api.weather.example/v1/forecast", Some("payerKey=abc"))
            .unwrap();
        assert_eq!(url.as_str(), "https://api.weather.example/v1/forecast");
    }

    #[test]
    fn test_invalid_origin_is_configuration_error() {
        assert!(matches!(
            build_target_url("not a url", None),
            Err(GatewayError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            build_target_url("ftp://files.example/data", None),
            Err(GatewayError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_query_sanitization() {
        assert!(sanitize_query("a=1&b=2").is_ok());
        assert_eq!(sanitize_query("a=1#frag").unwrap(), "a=1");
        assert!(sanitize_query("a=1\r\nHost: evil").is_err());
        assert!(sanitize_query("a=..%2f..%2fetc").is_err());
        assert!(sanitize_query("a=%2e%2e").is_err());
        assert!(sanitize_query("a=%0d%0a").is_err());
        assert!(sanitize_query("a=%00").is_err());
    }

    #[test]
    fn test_json_body_is_reserialized() {
        let req = TestRequest::post()
            .insert_header(("content-type", "application/json; charset=utf-8"))
            .to_http_request();
        let (body, is_json) = prepare_body(&req, Bytes::from_static(b"{ \"city\" :  \"nyc\" }"));
        assert!(is_json);
        assert_eq!(&body[..], br#"{"city":"nyc"}"#);

        let req = TestRequest::post()
            .insert_header(("content-type", "text/plain"))
            .to_http_request();
        let (body, is_json) = prepare_body(&req, Bytes::from_static(b"{ raw }"));
        assert!(!is_json);
        assert_eq!(&body[..], b"{ raw }");
    }
}
