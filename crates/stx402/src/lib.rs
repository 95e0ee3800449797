//! x402 payment protocol for STX-priced HTTP APIs.
//!
//! Implements the wire side of HTTP 402 pay-per-request: the `accepts`
//! challenge body, the base64 `payment-signature` / `payment-response`
//! headers, microSTX price formatting, and clients for the two external
//! capabilities the gateway leans on.
//!
//! # Collaborators
//!
//! - **Facilitator** ([`PaymentFacilitator`], [`HttpFacilitator`]): verifies
//!   a signed transfer and settles it on chain
//! - **Signer** ([`PaymentSigner`], [`HttpSigner`]): produces a signed
//!   transfer from a payer-held secret (self-signed mode only)
//!
//! # Quick example
//!
//! ```
//! use x402::{format_micro_stx, parse_stx_price};
//!
//! assert_eq!(format_micro_stx(1_500_000), "1.5");
//! assert_eq!(parse_stx_price("0.5").unwrap(), 500_000);
//! ```

pub mod amount;
pub mod constants;
pub mod error;
pub mod facilitator_client;
pub mod hmac;
pub mod payment;
pub mod response;
pub mod scheme;
pub mod signer_client;

pub use amount::{format_micro_stx, parse_stx_price};
pub use constants::*;
pub use error::X402Error;
pub use facilitator_client::HttpFacilitator;
pub use payment::*;
pub use response::*;
pub use scheme::*;
pub use signer_client::HttpSigner;
