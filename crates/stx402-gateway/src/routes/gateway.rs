use std::time::Instant;

use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

use crate::error::GatewayError;
use crate::gate::{self, GateOutcome};
use crate::metrics::REQUESTS_TOTAL;
use crate::proxy;
use crate::resolver::{self, RouteKey};
use crate::state::AppState;
use crate::validation;

/// Resolve → gate → ledger insert → forward → ledger update.
async fn monetized_call(
    req: &HttpRequest,
    state: &AppState,
    key: RouteKey,
    body: web::Bytes,
) -> Result<HttpResponse, GatewayError> {
    let endpoint = resolver::resolve(&state.db, &state.config.public_domain, &key).await?;

    // Settle nothing for an endpoint that cannot be reached.
    let target = proxy::build_target_url(&endpoint.origin_url, req.uri().query())?;
    if !state.config.allow_private_origins {
        validation::ensure_public_origin(&target).await?;
    }

    let resource = endpoint
        .canonical_url
        .clone()
        .unwrap_or_else(|| resolver::canonical_url(&state.config.public_domain, &key));
    let requirements = gate::build_requirements(
        state.config.network,
        &endpoint,
        &resource,
        req.method().as_str(),
    );

    let proof = match gate::process_payment(state, req, &endpoint, &requirements).await? {
        GateOutcome::Confirmed(proof) => proof,
        GateOutcome::Respond(response) => return Ok(response),
    };

    let confirmed_at = Instant::now();
    state
        .ledger
        .record_confirmed(endpoint.id, &proof, endpoint.price_micro_stx);

    proxy::forward(state, req, body, target, &proof, confirmed_at).await
}

async fn handle(
    req: HttpRequest,
    state: web::Data<AppState>,
    key: RouteKey,
    body: web::Bytes,
) -> Result<HttpResponse, GatewayError> {
    tracing::debug!(owner = %key.owner, api = %key.api, path = %key.path, "monetized call");
    let result = monetized_call(&req, &state, key, body).await;
    let status = match &result {
        Ok(response) => response.status(),
        Err(e) => e.status_code(),
    };
    REQUESTS_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();
    result
}

/// ANY /{owner}/{api}/{path:.*}
pub async fn endpoint_call(
    req: HttpRequest,
    path: web::Path<(String, String, String)>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let (owner, api, rest) = path.into_inner();
    handle(req, state, RouteKey::new(owner, api, rest), body).await
}

/// ANY /{owner}/{api} - endpoint registered with an empty path
pub async fn api_root_call(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let (owner, api) = path.into_inner();
    handle(req, state, RouteKey::new(owner, api, ""), body).await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/{owner}/{api}").route(web::route().to(api_root_call)))
        .service(web::resource("/{owner}/{api}/{path:.*}").route(web::route().to(endpoint_call)));
}
