use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the provider's body signature (`sha256=<hex>`).
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const PREFIX: &str = "sha256=";

/// Checks webhook bodies against the app secret shared with the provider.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Returns `true` only when `signature` is `sha256=<hex>` and matches the
    /// HMAC-SHA256 of `body`. Malformed input is a plain `false`.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> bool {
        let Some(provided) = signature.and_then(|s| s.trim().strip_prefix(PREFIX)) else {
            return false;
        };
        let Ok(provided) = hex::decode(provided) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(body);
        // verify_slice compares in constant time and rejects wrong lengths.
        mac.verify_slice(&provided).is_ok()
    }

    /// Reads [`SIGNATURE_HEADER`] from `headers` and verifies `body`.
    pub fn verify_headers(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        self.verify(body, signature)
    }

    /// Produces the header value a provider would send for `body`.
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(body);
        format!("{PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
    }
}
