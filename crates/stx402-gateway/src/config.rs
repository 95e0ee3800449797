use std::env;
use std::time::Duration;

use url::Url;
use x402::StacksNetwork;

const DEFAULT_FACILITATOR_URL: &str = "https://facilitator.stacksx402.com";
const DEFAULT_PORT: u16 = 4024;
const DEFAULT_DB_PATH: &str = "./stx402.db";
const DEFAULT_RATE_LIMIT_RPM: u32 = 120;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct GatewayConfig {
    /// Network requirements are priced on
    pub network: StacksNetwork,
    /// Server port
    pub port: u16,
    /// SQLite database path
    pub db_path: String,
    /// Base of the public canonical URLs (`{public_domain}/{owner}/{api}/{path}`)
    pub public_domain: String,
    /// Facilitator URL for payment verification and settlement
    pub facilitator_url: String,
    /// HMAC shared secret for facilitator auth (None = unsigned requests)
    pub hmac_secret: Option<Vec<u8>>,
    /// Bound on each facilitator round trip
    pub facilitator_timeout: Duration,
    /// Bound on each origin round trip
    pub upstream_timeout: Duration,
    /// Signing service for self-signed payments
    pub signer_url: Option<String>,
    /// Self-signed mode must be opted into explicitly
    pub allow_self_signed: bool,
    /// Permit origins on private/loopback addresses (local development only)
    pub allow_private_origins: bool,
    /// STX/USD quote source for the 402 USD annotation
    pub price_quote_url: Option<String>,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Rate limit requests per minute
    pub rate_limit_rpm: u32,
    /// Bearer token required for /metrics endpoint (None = public)
    pub metrics_token: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("network", &self.network)
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("public_domain", &self.public_domain)
            .field("facilitator_url", &self.facilitator_url)
            .field(
                "hmac_secret",
                &self.hmac_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("facilitator_timeout", &self.facilitator_timeout)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("signer_url", &self.signer_url)
            .field("allow_self_signed", &self.allow_self_signed)
            .field("allow_private_origins", &self.allow_private_origins)
            .field("price_quote_url", &self.price_quote_url)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl GatewayConfig {
    /// Configuration suitable for tests and local runs: testnet, in-memory
    /// defaults, no signer, no quote source.
    pub fn for_local(public_domain: &str, facilitator_url: &str) -> Self {
        Self {
            network: StacksNetwork::Testnet,
            port: DEFAULT_PORT,
            db_path: ":memory:".to_string(),
            public_domain: public_domain.trim_end_matches('/').to_string(),
            facilitator_url: facilitator_url.to_string(),
            hmac_secret: None,
            facilitator_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            upstream_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            signer_url: None,
            allow_self_signed: false,
            allow_private_origins: true,
            price_quote_url: None,
            allowed_origins: vec!["*".to_string()],
            rate_limit_rpm: DEFAULT_RATE_LIMIT_RPM,
            metrics_token: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let network = match env::var("NETWORK") {
            Ok(v) if !v.is_empty() => v.parse().map_err(ConfigError::InvalidNetwork)?,
            _ => StacksNetwork::default(),
        };

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let db_path = env::var("DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

        let public_domain = env::var("PUBLIC_DOMAIN")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{port}"));
        Url::parse(&public_domain).map_err(|_| ConfigError::InvalidUrl(public_domain.clone()))?;
        let public_domain = public_domain.trim_end_matches('/').to_string();

        let facilitator_url =
            env::var("FACILITATOR_URL").unwrap_or_else(|_| DEFAULT_FACILITATOR_URL.to_string());
        Url::parse(&facilitator_url)
            .map_err(|_| ConfigError::InvalidUrl(facilitator_url.clone()))?;

        let hmac_secret = env::var("FACILITATOR_SHARED_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());

        let facilitator_timeout = duration_secs("FACILITATOR_TIMEOUT_SECS")?;
        let upstream_timeout = duration_secs("UPSTREAM_TIMEOUT_SECS")?;

        let signer_url = env::var("SIGNER_URL").ok().filter(|s| !s.is_empty());
        if let Some(ref url) = signer_url {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        }

        let allow_self_signed = flag("ALLOW_SELF_SIGNED");
        if allow_self_signed && signer_url.is_none() {
            return Err(ConfigError::MissingRequired("SIGNER_URL"));
        }

        let allow_private_origins = flag("ALLOW_PRIVATE_ORIGINS");

        let price_quote_url = env::var("PRICE_QUOTE_URL").ok().filter(|s| !s.is_empty());
        if let Some(ref url) = price_quote_url {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        }

        let allowed_origins: Vec<String> = env::var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ]
            });

        let rate_limit_rpm = env::var("RATE_LIMIT_RPM")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|rpm| *rpm > 0)
            .unwrap_or(DEFAULT_RATE_LIMIT_RPM);

        let metrics_token = env::var("METRICS_TOKEN").ok().filter(|s| !s.is_empty());

        if hmac_secret.is_none() {
            tracing::warn!(
                "FACILITATOR_SHARED_SECRET not set, facilitator requests will not be signed"
            );
        }
        if allow_self_signed {
            tracing::warn!(
                "ALLOW_SELF_SIGNED=true, callers may hand the gateway their secret key. \
                 Only enable this for trusted integration environments."
            );
        }
        if allow_private_origins {
            tracing::warn!("ALLOW_PRIVATE_ORIGINS=true, origins on private networks are reachable");
        }
        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set, /metrics endpoint is publicly accessible");
        }

        Ok(Self {
            network,
            port,
            db_path,
            public_domain,
            facilitator_url,
            hmac_secret,
            facilitator_timeout,
            upstream_timeout,
            signer_url,
            allow_self_signed,
            allow_private_origins,
            price_quote_url,
            allowed_origins,
            rate_limit_rpm,
            metrics_token,
        })
    }
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

fn duration_secs(name: &'static str) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => v
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or(ConfigError::InvalidNumber(name, v)),
        _ => Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid value for {0}: {1}")]
    InvalidNumber(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config_trims_domain() {
        let config = GatewayConfig::for_local("https://gw.example/", "http://127.0.0.1:9");
        assert_eq!(config.public_domain, "https://gw.example");
        assert_eq!(config.network, StacksNetwork::Testnet);
        assert!(!config.allow_self_signed);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = GatewayConfig::for_local("https://gw.example", "http://127.0.0.1:9");
        config.hmac_secret = Some(b"super-secret-value".to_vec());
        config.metrics_token = Some("metrics-token-value".to_string());
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret-value"));
        assert!(!printed.contains("metrics-token-value"));
        assert!(printed.contains("[REDACTED]"));
    }
}
