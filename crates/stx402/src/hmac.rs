use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the HMAC of a facilitator request body.
pub const FACILITATOR_AUTH_HEADER: &str = "X-Facilitator-Auth";

/// Compute HMAC-SHA256 over the given body bytes using the shared secret.
/// Returns the hex-encoded MAC.
pub fn compute_hmac(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex HMAC-SHA256 signature against the body in constant time.
pub fn verify_hmac(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    let expected = hex::decode(signature).unwrap_or_else(|_| vec![0u8; 32]);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_body_verifies() {
        let sig = compute_hmac(b"shared", b"{\"x402Version\":1}");
        assert_eq!(sig.len(), 64);
        assert!(verify_hmac(b"shared", b"{\"x402Version\":1}", &sig));
    }

    #[test]
    fn test_wrong_secret_or_body_fails() {
        let sig = compute_hmac(b"shared", b"body");
        assert!(!verify_hmac(b"other", b"body", &sig));
        assert!(!verify_hmac(b"shared", b"tampered", &sig));
        assert!(!verify_hmac(b"shared", b"body", "zz-not-hex"));
    }
}
