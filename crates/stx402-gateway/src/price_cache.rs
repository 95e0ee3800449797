//! STX/USD quote used to annotate 402 challenges with an approximate USD price.
//!
//! The cache holds one entry. A fresh entry is served directly; an expired one
//! triggers a single upstream fetch, and if that fetch fails the stale value is
//! served instead. Failed attempts count against the TTL like successful ones,
//! and while one caller refreshes every other caller gets the current value
//! without waiting. With no quote source configured the cache is inert and
//! challenges carry no `priceUsd`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use x402::MICRO_STX_PER_STX;

/// Default time a fetched quote is considered fresh.
pub const DEFAULT_QUOTE_TTL: Duration = Duration::from_secs(60);

const QUOTE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Time source for the cache.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.start + offset
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Request(String),

    #[error("quote response has no numeric usd field")]
    MissingUsd,
}

/// Where USD-per-STX quotes come from.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn usd_per_stx(&self) -> Result<f64, QuoteError>;
}

/// Fetches a JSON document and reads the first numeric `usd` field found
/// anywhere in it (`{"blockstack":{"usd":0.61}}` and `{"usd":0.61}` both work).
pub struct HttpQuoteSource {
    client: reqwest::Client,
    url: String,
}

impl HttpQuoteSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn usd_per_stx(&self) -> Result<f64, QuoteError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(QUOTE_FETCH_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| QuoteError::Request(e.without_url().to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QuoteError::Request(e.without_url().to_string()))?;

        find_usd(&body).ok_or(QuoteError::MissingUsd)
    }
}

fn find_usd(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(usd) = map.get("usd").and_then(|v| v.as_f64()) {
                return Some(usd);
            }
            map.values().find_map(find_usd)
        }
        serde_json::Value::Array(items) => items.iter().find_map(find_usd),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct QuoteState {
    usd_per_stx: Option<f64>,
    attempted_at: Option<Instant>,
    refreshing: bool,
}

/// Clears the in-flight flag even if the refreshing future is dropped.
struct RefreshGuard<'a> {
    state: &'a Mutex<QuoteState>,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        lock_state(self.state).refreshing = false;
    }
}

fn lock_state(state: &Mutex<QuoteState>) -> MutexGuard<'_, QuoteState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct PriceQuoteCache {
    source: Option<Arc<dyn QuoteSource>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Mutex<QuoteState>,
}

impl PriceQuoteCache {
    pub fn new(source: Arc<dyn QuoteSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source: Some(source),
            clock,
            ttl: DEFAULT_QUOTE_TTL,
            state: Mutex::new(QuoteState::default()),
        }
    }

    /// A cache with no source; [`Self::usd_per_stx`] always yields `None`.
    pub fn disabled() -> Self {
        Self {
            source: None,
            clock: Arc::new(SystemClock),
            ttl: DEFAULT_QUOTE_TTL,
            state: Mutex::new(QuoteState::default()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Current quote, refreshing it if the last attempt has expired.
    ///
    /// At most one caller is ever waiting on the quote source.
    pub async fn usd_per_stx(&self) -> Option<f64> {
        let source = self.source.as_ref()?;
        let now = self.clock.now();

        {
            let mut state = lock_state(&self.state);
            let due = state
                .attempted_at
                .map_or(true, |at| now.saturating_duration_since(at) >= self.ttl);
            if !due || state.refreshing {
                return state.usd_per_stx;
            }
            state.refreshing = true;
            state.attempted_at = Some(now);
        }

        let _refresh = RefreshGuard { state: &self.state };
        let fetched = source.usd_per_stx().await;

        let mut state = lock_state(&self.state);
        match fetched {
            Ok(usd_per_stx) => {
                state.usd_per_stx = Some(usd_per_stx);
                Some(usd_per_stx)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    stale = state.usd_per_stx.is_some(),
                    "STX/USD quote refresh failed"
                );
                state.usd_per_stx
            }
        }
    }

    /// USD value of `price_micro_stx`, if a quote is available.
    pub async fn usd_price(&self, price_micro_stx: u64) -> Option<String> {
        let rate = self.usd_per_stx().await?;
        Some(format_usd(price_micro_stx, rate))
    }
}

/// Render `micro * rate / 1e6` with at most six decimals, trailing zeros trimmed.
pub fn format_usd(price_micro_stx: u64, usd_per_stx: f64) -> String {
    let usd = price_micro_stx as f64 / MICRO_STX_PER_STX as f64 * usd_per_stx;
    let rendered = format!("{usd:.6}");
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
