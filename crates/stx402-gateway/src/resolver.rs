use std::fmt;
use std::sync::Arc;

use actix_web::web;

use crate::db::{Database, EndpointRow};
use crate::error::GatewayError;

/// `(owner, api, path)` as taken from the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteKey {
    pub owner: String,
    pub api: String,
    pub path: String,
}

impl RouteKey {
    pub fn new(owner: impl Into<String>, api: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            api: api.into(),
            path: path.into().trim_matches('/').to_string(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}/{}", self.owner, self.api)
        } else {
            write!(f, "{}/{}/{}", self.owner, self.api, self.path)
        }
    }
}

/// Validated routing and pricing facts for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub id: i64,
    pub origin_url: String,
    pub price_micro_stx: u64,
    pub payee_address: String,
    pub description: Option<String>,
    pub active: bool,
    pub canonical_url: Option<String>,
}

impl TryFrom<EndpointRow> for EndpointConfig {
    type Error = String;

    fn try_from(row: EndpointRow) -> Result<Self, Self::Error> {
        let price_micro_stx = u64::try_from(row.price_micro_stx)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| format!("non-positive price {}", row.price_micro_stx))?;

        let payee_address = row
            .payee_address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or("owner has no wallet address")?;

        let origin_url = row
            .origin_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or("empty origin URL")?;

        Ok(Self {
            id: row.id,
            origin_url,
            price_micro_stx,
            payee_address,
            description: row.description.filter(|d| !d.is_empty()),
            active: row.active,
            canonical_url: row.canonical_url,
        })
    }
}

/// Public URL of an endpoint: `{public_domain}/{owner}/{api}/{path}`.
pub fn canonical_url(public_domain: &str, key: &RouteKey) -> String {
    format!("{}/{}", public_domain.trim_end_matches('/'), key)
}

/// Look up an active endpoint.
///
/// Every miss (unknown owner, api or path, inactive endpoint, or a row that
/// fails validation) comes back as the same [`GatewayError::NotFound`]. A
/// missing canonical URL is filled in on the returned value and persisted in
/// the background; a failed persist only logs.
pub async fn resolve(
    db: &Arc<Database>,
    public_domain: &str,
    key: &RouteKey,
) -> Result<EndpointConfig, GatewayError> {
    let lookup_db = Arc::clone(db);
    let lookup_key = key.clone();
    let row = web::block(move || {
        lookup_db.find_endpoint(&lookup_key.owner, &lookup_key.api, &lookup_key.path)
    })
    .await
    .map_err(|e| GatewayError::Internal(format!("store lookup cancelled: {e}")))??
    .ok_or_else(|| GatewayError::NotFound(key.to_string()))?;

    let mut endpoint = EndpointConfig::try_from(row).map_err(|reason| {
        tracing::warn!(route = %key, reason = %reason, "endpoint row is misconfigured");
        GatewayError::NotFound(key.to_string())
    })?;

    if endpoint.canonical_url.is_none() {
        let url = canonical_url(public_domain, key);
        backfill_canonical_url(Arc::clone(db), endpoint.id, url.clone());
        endpoint.canonical_url = Some(url);
    }

    Ok(endpoint)
}

fn backfill_canonical_url(db: Arc<Database>, endpoint_id: i64, url: String) {
    tokio::task::spawn_blocking(move || match db.set_canonical_url(endpoint_id, &url) {
        Ok(_) => tracing::debug!(endpoint_id, url = %url, "canonical URL recorded"),
        Err(e) => tracing::warn!(endpoint_id, error = %e, "failed to record canonical URL"),
    });
}
