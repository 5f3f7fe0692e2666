//! Webhook signature verification: HMAC-SHA256 over the raw request body,
//! compared against the `X-Signature: sha256=<hex>` header. Verification is
//! a no-op when no secret is configured, so local and test setups run
//! unsigned.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
const SIG_PREFIX: &str = "sha256=";

/// Compute the full header value form `sha256=<hex>` for a body.
pub fn sign_bytes(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(body);
    format!("{SIG_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Extract the hex digest from a `sha256=<hex>` header value. Returns `None`
/// on any formatting problem.
pub fn parse_signature_header(value: &str) -> Option<String> {
    let hex_part = value.trim().strip_prefix(SIG_PREFIX)?;
    if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(hex_part.to_ascii_lowercase())
}

/// Verify a header value against the body. Constant-time comparison via the
/// MAC itself.
pub fn verify(secret: &[u8], body: &[u8], header_value: Option<&str>) -> bool {
    let Some(provided_hex) = header_value.and_then(parse_signature_header) else {
        return false;
    };
    let Ok(provided) = hex::decode(provided_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
