//! Compact HS256 tokens.
//!
//! ```text
//! base64url(header_json) "." base64url(payload_json) "." base64url(hmac_sha256)
//! ```
//!
//! The payload always carries `iat` and `exp` as unix seconds. Tokens are
//! self-contained: verification needs the secret and a clock, nothing else.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value, json};
use sha2::Sha256;
use tracing::warn;

use crate::context::Context;
use crate::error::Error;

use super::unix_now;

type HmacSha256 = Hmac<Sha256>;

/// Decoded token payload.
pub type Claims = Map<String, Value>;

const ALGORITHM: &str = "HS256";

pub const UNAUTHORIZED: &str = "Unauthorized";
pub const INVALID_TOKEN: &str = "Invalid or expired token";

/// Issues and verifies tokens signed with one shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self { secret: secret.as_ref().to_vec() }
    }

    /// Signs `claims` plus `iat = now` and `exp = now + ttl_secs`.
    pub fn issue(&self, claims: Claims, ttl_secs: u64) -> String {
        self.issue_at(claims, ttl_secs, unix_now())
    }

    pub fn issue_at(&self, mut claims: Claims, ttl_secs: u64, now: u64) -> String {
        claims.insert("iat".to_owned(), now.into());
        claims.insert("exp".to_owned(), now.saturating_add(ttl_secs).into());

        let header = URL_SAFE_NO_PAD.encode(json!({ "typ": "JWT", "alg": ALGORITHM }).to_string());
        let payload = URL_SAFE_NO_PAD.encode(Value::Object(claims).to_string());

        let mut mac = self.mac();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{header}.{payload}.{signature}")
    }

    /// Returns the claims of a well-formed, correctly signed, unexpired token.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        self.verify_at(token, unix_now())
    }

    /// [`verify`](Self::verify) against an explicit clock. A token is still
    /// valid during the second named by its `exp`.
    pub fn verify_at(&self, token: &str, now: u64) -> Option<Claims> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };

        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        // Constant-time comparison.
        mac.verify_slice(&signature).ok()?;

        let header: Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).ok()?).ok()?;
        if header.get("alg").and_then(Value::as_str) != Some(ALGORITHM) {
            return None;
        }

        let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
        let exp = claims.get("exp")?.as_u64()?;
        (exp >= now).then_some(claims)
    }

    /// Extracts and verifies `Authorization: Bearer <token>`.
    ///
    /// Fails with [`Error::Unauthorized`], which renders as a `401` envelope,
    /// so handlers can simply `?` it.
    pub fn authenticate(&self, ctx: &Context) -> Result<Claims, Error> {
        let Some(token) = ctx.header("authorization").and_then(bearer_token) else {
            warn!(path = %ctx.path(), "missing or malformed authorization header");
            return Err(Error::Unauthorized(UNAUTHORIZED));
        };

        self.verify(token).ok_or_else(|| {
            warn!(path = %ctx.path(), "rejected bearer token");
            Error::Unauthorized(INVALID_TOKEN)
        })
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(char::is_whitespace)?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use crate::method::Method;

    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret")
    }

    fn claims(sub: &str) -> Claims {
        let mut claims = Claims::new();
        claims.insert("sub".to_owned(), sub.into());
        claims
    }

    #[test]
    fn token_has_three_url_safe_segments() {
        let token = codec().issue_at(claims("u1"), 3600, NOW);
        let parts: Vec<_> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        for part in parts {
            assert!(part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn issued_token_verifies_until_expiry() {
        let token = codec().issue_at(claims("u1"), 3600, NOW);

        let verified = codec().verify_at(&token, NOW).unwrap();
        assert_eq!(verified["sub"], "u1");
        assert_eq!(verified["iat"], NOW);
        assert_eq!(verified["exp"], NOW + 3600);

        assert!(codec().verify_at(&token, NOW + 3600).is_some());
        assert!(codec().verify_at(&token, NOW + 3601).is_none());
    }

    #[test]
    fn tampered_signature_fails() {
        let token = codec().issue_at(claims("u1"), 3600, NOW);
        let sig_start = token.rfind('.').unwrap() + 1;

        for i in sig_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert!(codec().verify_at(&tampered, NOW).is_none(), "byte {i} tampered");
        }
    }

    #[test]
    fn tampered_payload_fails() {
        let token = codec().issue_at(claims("u1"), 3600, NOW);
        let forged = codec().issue_at(claims("admin"), 3600, NOW);

        let mut parts: Vec<_> = token.split('.').collect();
        parts[1] = forged.split('.').nth(1).unwrap();
        assert!(codec().verify_at(&parts.join("."), NOW).is_none());
    }

    /// Signs arbitrary header and payload JSON with the test secret.
    fn sign(header: Value, payload: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(header.to_string());
        let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
        let mut mac = codec().mac();
        mac.update(format!("{header}.{payload}").as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{header}.{payload}.{signature}")
    }

    #[test]
    fn hand_signed_token_verifies() {
        let token = sign(json!({ "typ": "JWT", "alg": "HS256" }), json!({ "sub": "u1", "exp": NOW }));
        assert!(codec().verify_at(&token, NOW).is_some());
    }

    #[test]
    fn non_hs256_header_fails_even_when_signed() {
        let token = sign(json!({ "typ": "JWT", "alg": "none" }), json!({ "sub": "u1", "exp": NOW + 60 }));
        assert!(codec().verify_at(&token, NOW).is_none());

        let token = sign(json!({ "typ": "JWT" }), json!({ "sub": "u1", "exp": NOW + 60 }));
        assert!(codec().verify_at(&token, NOW).is_none());
    }

    #[test]
    fn payload_without_exp_fails_even_when_signed() {
        let token = sign(json!({ "typ": "JWT", "alg": "HS256" }), json!({ "sub": "u1", "iat": NOW }));
        assert!(codec().verify_at(&token, NOW).is_none());
    }

    #[test]
    fn wrong_secret_fails() {
        let token = TokenCodec::new("other").issue_at(claims("u1"), 3600, NOW);
        assert!(codec().verify_at(&token, NOW).is_none());
    }

    #[test]
    fn wrong_segment_count_fails() {
        assert!(codec().verify_at("a.b", NOW).is_none());
        assert!(codec().verify_at("a.b.c.d", NOW).is_none());
        assert!(codec().verify_at("", NOW).is_none());
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer   "), None);
    }

    #[test]
    fn authenticate_distinguishes_missing_from_invalid() {
        let missing = Context::new(Method::Get, "/me");
        assert!(matches!(codec().authenticate(&missing), Err(Error::Unauthorized(UNAUTHORIZED))));

        let invalid = Context::new(Method::Get, "/me").with_header("Authorization", "Bearer x.y.z");
        assert!(matches!(codec().authenticate(&invalid), Err(Error::Unauthorized(INVALID_TOKEN))));

        let token = codec().issue(claims("u1"), 60);
        let valid = Context::new(Method::Get, "/me")
            .with_header("authorization", &format!("BEARER {token}"));
        assert_eq!(codec().authenticate(&valid).unwrap()["sub"], "u1");
    }
}
