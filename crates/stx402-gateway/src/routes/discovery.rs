use actix_web::{web, HttpResponse};

use crate::error::GatewayError;
use crate::gate;
use crate::resolver::{self, RouteKey};
use crate::state::AppState;

async fn publish(state: &AppState, key: RouteKey) -> Result<HttpResponse, GatewayError> {
    let endpoint = resolver::resolve(&state.db, &state.config.public_domain, &key).await?;
    let resource = endpoint
        .canonical_url
        .clone()
        .unwrap_or_else(|| resolver::canonical_url(&state.config.public_domain, &key));
    let requirements =
        gate::build_requirements(state.config.network, &endpoint, &resource, "GET");

    Ok(gate::payment_required_response(
        &state.price_cache,
        endpoint.price_micro_stx,
        requirements,
        "payment_required",
    )
    .await)
}

/// GET /x402/{owner}/{api}/{path:.*} - payment requirements for crawlers, always 402
pub async fn endpoint_schema(
    path: web::Path<(String, String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let (owner, api, rest) = path.into_inner();
    publish(&state, RouteKey::new(owner, api, rest)).await
}

/// GET /x402/{owner}/{api}
pub async fn api_root_schema(
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let (owner, api) = path.into_inner();
    publish(&state, RouteKey::new(owner, api, "")).await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/x402/{owner}/{api}", web::get().to(api_root_schema))
        .route("/x402/{owner}/{api}/{path:.*}", web::get().to(endpoint_schema));
}
