//! HMAC signing for stream URLs and bearer stream tokens
//!
//! Signed media URLs carry `expires` and `signature` query parameters
//! computed over `path:expires` with HMAC-SHA256. Bearer stream tokens use
//! the same key over `userId.expiry`; issuance is external, this module
//! only verifies.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Signs media URLs with an expiry
pub struct UrlSigner {
    key: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    fn mac_hex(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Build a signed absolute URL for a media path under the given base
    pub fn sign_url(
        &self,
        base: &Url,
        path: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        let expires = now.timestamp() + ttl.as_secs() as i64;
        let mut url = base
            .join(path)
            .map_err(|e| AppError::internal(format!("invalid media path '{path}': {e}")))?;
        let signature = self.mac_hex(&format!("{}:{expires}", url.path()));
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.to_string())
    }

    /// Verify a previously signed path, rejecting bad signatures and
    /// anything past its expiry
    pub fn verify(&self, path: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        if now.timestamp() > expires {
            return false;
        }
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{path}:{expires}").as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}

/// Verifies bearer stream tokens of the form `<userId>.<expiryUnix>.<hexSig>`
pub struct StreamTokenVerifier {
    key: Vec<u8>,
}

impl StreamTokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    /// Extract the authenticated user id from a token
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> AppResult<Uuid> {
        let mut parts = token.splitn(3, '.');
        let (Some(user_part), Some(expiry_part), Some(sig_part)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AppError::unauthenticated("Malformed bearer token"));
        };

        let user_id = Uuid::parse_str(user_part)
            .map_err(|_| AppError::unauthenticated("Malformed bearer token"))?;
        let expiry: i64 = expiry_part
            .parse()
            .map_err(|_| AppError::unauthenticated("Malformed bearer token"))?;

        let provided = hex::decode(sig_part)
            .map_err(|_| AppError::unauthenticated("Malformed bearer token"))?;
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{user_part}.{expiry_part}").as_bytes());
        if mac.verify_slice(&provided).is_err() {
            return Err(AppError::unauthenticated("Invalid token signature"));
        }

        if now.timestamp() > expiry {
            return Err(AppError::unauthenticated("Token expired"));
        }

        Ok(user_id)
    }

    /// Mint a token. Production issuance lives with the external identity
    /// service; this exists for local tooling and tests.
    pub fn issue(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> String {
        let payload = format!("{user_id}.{}", expires_at.timestamp());
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        format!("{payload}.{}", hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_urls_verify_until_expiry() {
        let signer = UrlSigner::new("test-secret");
        let base = Url::parse("https://cdn-1.example.com/").unwrap();
        let now = Utc::now();

        let signed = signer
            .sign_url(&base, "audio/abc/192kbps/full.mp3", Duration::from_secs(3600), now)
            .unwrap();
        let url = Url::parse(&signed).unwrap();

        let expires: i64 = url
            .query_pairs()
            .find(|(k, _)| k == "expires")
            .unwrap()
            .1
            .parse()
            .unwrap();
        let signature = url
            .query_pairs()
            .find(|(k, _)| k == "signature")
            .map(|(_, v)| v.to_string())
            .unwrap();

        assert!(signer.verify(url.path(), expires, &signature, now));
        let after_expiry = now + chrono::Duration::seconds(3601);
        assert!(!signer.verify(url.path(), expires, &signature, after_expiry));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let signer = UrlSigner::new("test-secret");
        assert!(!signer.verify("audio/abc/full.mp3", i64::MAX, "deadbeef", Utc::now()));
    }

    #[test]
    fn token_round_trip() {
        let verifier = StreamTokenVerifier::new("test-secret");
        let user = Uuid::new_v4();
        let now = Utc::now();

        let token = verifier.issue(user, now + chrono::Duration::hours(1));
        assert_eq!(verifier.verify(&token, now).unwrap(), user);
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = StreamTokenVerifier::new("test-secret");
        let user = Uuid::new_v4();
        let now = Utc::now();

        let token = verifier.issue(user, now - chrono::Duration::seconds(1));
        let err = verifier.verify(&token, now).unwrap_err();
        assert_eq!(err.code(), "UNAUTHENTICATED");
    }

    #[test]
    fn token_signed_with_other_key_is_rejected() {
        let issuer = StreamTokenVerifier::new("other-secret");
        let verifier = StreamTokenVerifier::new("test-secret");
        let token = issuer.issue(Uuid::new_v4(), Utc::now() + chrono::Duration::hours(1));
        assert!(verifier.verify(&token, Utc::now()).is_err());
    }
}
