use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header GoCardless puts the body signature in.
pub const SIGNATURE_HEADER: &str = "Webhook-Signature";

/// Hex-encoded HMAC-SHA256 of `body` keyed by `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a GoCardless `Webhook-Signature` value against every configured
/// secret. Absent or empty signatures never authenticate.
pub fn authenticate<'a, I>(body: &[u8], signature: Option<&str>, secrets: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    let supplied = match signature {
        Some(s) if !s.is_empty() => s,
        _ => return false,
    };

    secrets.into_iter().any(|secret| {
        let computed = sign(secret, body);
        bool::from(computed.as_bytes().ct_eq(supplied.as_bytes()))
    })
}
