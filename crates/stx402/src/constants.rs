use std::fmt;
use std::str::FromStr;

/// x402 protocol version spoken by the gateway.
pub const X402_VERSION: u32 = 1;

/// x402 scheme name for fixed-price STX transfers.
pub const SCHEME_NAME: &str = "exact";

/// Asset identifier advertised in payment requirements.
pub const STX_ASSET: &str = "STX";

/// STX has 6 decimal places (1 STX = 1,000,000 microSTX).
pub const TOKEN_DECIMALS: u32 = 6;

/// Number of microSTX in one STX.
pub const MICRO_STX_PER_STX: u64 = 1_000_000;

/// Default time a signed payment stays acceptable to the facilitator.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

/// Request header carrying a base64-encoded [`crate::PaymentPayload`].
pub const PAYMENT_SIGNATURE_HEADER: &str = "payment-signature";

/// Response header carrying the base64-encoded settlement envelope.
pub const PAYMENT_RESPONSE_HEADER: &str = "payment-response";

/// Stacks network the gateway prices and settles on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StacksNetwork {
    Mainnet,
    #[default]
    Testnet,
}

impl StacksNetwork {
    /// Identifier used in the `network` field of requirements and receipts.
    pub fn as_str(&self) -> &'static str {
        match self {
            StacksNetwork::Mainnet => "mainnet",
            StacksNetwork::Testnet => "testnet",
        }
    }

    /// Block explorer link for a transaction id.
    pub fn explorer_tx_url(&self, txid: &str) -> String {
        format!(
            "https://explorer.hiro.so/txid/{}?chain={}",
            txid,
            self.as_str()
        )
    }
}

impl fmt::Display for StacksNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StacksNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "stacks:1" => Ok(StacksNetwork::Mainnet),
            "testnet" | "stacks:2147483648" => Ok(StacksNetwork::Testnet),
            other => Err(format!("unknown Stacks network '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_parses_names_and_caip2_ids() {
        assert_eq!("mainnet".parse::<StacksNetwork>(), Ok(StacksNetwork::Mainnet));
        assert_eq!("TESTNET".parse::<StacksNetwork>(), Ok(StacksNetwork::Testnet));
        assert_eq!(
            "stacks:2147483648".parse::<StacksNetwork>(),
            Ok(StacksNetwork::Testnet)
        );
        assert!("devnet".parse::<StacksNetwork>().is_err());
    }

    #[test]
    fn explorer_link_carries_chain() {
        let url = StacksNetwork::Testnet.explorer_tx_url("0xabc");
        assert_eq!(url, "https://explorer.hiro.so/txid/0xabc?chain=testnet");
    }
}
