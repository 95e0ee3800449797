//! Monetized reverse proxy: callers pay per request in STX via the x402
//! protocol, and paid requests are relayed to the API owner's origin.
//!
//! A request for `/{owner}/{api}/{path}` goes through the [`resolver`], the
//! payment [`gate`], the [`proxy`] forwarder and the asynchronous call
//! [`ledger`], in that order.

pub mod config;
pub mod cors;
pub mod db;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod metrics;
pub mod price_cache;
pub mod proxy;
pub mod resolver;
pub mod routes;
pub mod state;
pub mod validation;

pub use config::GatewayConfig;
pub use db::Database;
pub use error::GatewayError;
pub use state::AppState;
