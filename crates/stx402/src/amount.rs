//! Conversions between human-readable STX prices and microSTX amounts.
//!
//! Integer-only: no `f64` anywhere on the pricing path.

use crate::constants::{MICRO_STX_PER_STX, TOKEN_DECIMALS};
use crate::error::X402Error;

/// Render a microSTX amount as a decimal STX string with trailing zeros trimmed.
///
/// `1_500_000` → `"1.5"`, `1_000_000` → `"1"`, `1_000_001` → `"1.000001"`.
pub fn format_micro_stx(micro: u64) -> String {
    let whole = micro / MICRO_STX_PER_STX;
    let frac = micro % MICRO_STX_PER_STX;
    let frac_str = format!("{:0width$}", frac, width = TOKEN_DECIMALS as usize);
    let frac_str = frac_str.trim_end_matches('0');

    let rendered = if frac_str.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac_str}")
    };

    if rendered.is_empty() {
        "0".to_string()
    } else {
        rendered
    }
}

/// Parse a human-readable STX price (e.g. "0.5", "1", "0.000001 STX") into microSTX.
///
/// Fractional digits beyond the token's six decimals are truncated.
pub fn parse_stx_price(price: &str) -> Result<u64, X402Error> {
    let cleaned: String = price
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return Err(X402Error::InvalidAmount(format!(
            "invalid price '{price}': no numeric content"
        )));
    }

    let overflow = || X402Error::InvalidAmount(format!("invalid price '{price}': overflow"));
    let (integer_part, fractional_part) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));

    let integer: u64 = if integer_part.is_empty() {
        0
    } else {
        integer_part
            .parse()
            .map_err(|e| X402Error::InvalidAmount(format!("invalid price '{price}': {e}")))?
    };

    let decimals = TOKEN_DECIMALS as usize;
    let frac_str = &fractional_part[..fractional_part.len().min(decimals)];
    let fractional: u64 = if frac_str.is_empty() {
        0
    } else {
        frac_str.parse().map_err(|e| {
            X402Error::InvalidAmount(format!("invalid price '{price}': fractional part: {e}"))
        })?
    };
    let scale = 10u64.pow((decimals - frac_str.len()) as u32);

    integer
        .checked_mul(MICRO_STX_PER_STX)
        .ok_or_else(overflow)?
        .checked_add(fractional.checked_mul(scale).ok_or_else(overflow)?)
        .ok_or_else(overflow)
}
