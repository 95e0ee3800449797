use std::sync::Arc;

use x402::{HttpFacilitator, HttpSigner, PaymentFacilitator, PaymentSigner};

use crate::config::GatewayConfig;
use crate::db::Database;
use crate::error::GatewayError;
use crate::ledger::CallLedger;
use crate::price_cache::{HttpQuoteSource, PriceQuoteCache, SystemClock};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub db: Arc<Database>,
    pub http_client: reqwest::Client,
    pub facilitator: Arc<dyn PaymentFacilitator>,
    /// Only present when self-signed payments are enabled
    pub signer: Option<Arc<dyn PaymentSigner>>,
    pub ledger: CallLedger,
    pub price_cache: Arc<PriceQuoteCache>,
}

impl AppState {
    /// Wire the HTTP collaborators described by `config`.
    ///
    /// Spawns the ledger worker, so this must run inside a tokio runtime.
    pub fn new(config: GatewayConfig, db: Database) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none()) // Prevent SSRF via redirects
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to create HTTP client: {e}")))?;

        let facilitator: Arc<dyn PaymentFacilitator> = Arc::new(
            HttpFacilitator::new(http_client.clone(), config.facilitator_url.clone())
                .with_hmac_secret(config.hmac_secret.clone())
                .with_timeout(config.facilitator_timeout),
        );

        let signer: Option<Arc<dyn PaymentSigner>> = match (&config.signer_url, config.allow_self_signed) {
            (Some(url), true) => Some(Arc::new(HttpSigner::new(
                http_client.clone(),
                url.clone(),
                config.facilitator_timeout,
            ))),
            _ => None,
        };

        let price_cache = match &config.price_quote_url {
            Some(url) => PriceQuoteCache::new(
                Arc::new(HttpQuoteSource::new(http_client.clone(), url.clone())),
                Arc::new(SystemClock),
            ),
            None => PriceQuoteCache::disabled(),
        };

        let db = Arc::new(db);
        let ledger = CallLedger::spawn(Arc::clone(&db));

        Ok(Self {
            config: Arc::new(config),
            db,
            http_client,
            facilitator,
            signer,
            ledger,
            price_cache: Arc::new(price_cache),
        })
    }

    pub fn with_facilitator(mut self, facilitator: Arc<dyn PaymentFacilitator>) -> Self {
        self.facilitator = facilitator;
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn PaymentSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_price_cache(mut self, price_cache: PriceQuoteCache) -> Self {
        self.price_cache = Arc::new(price_cache);
        self
    }
}
