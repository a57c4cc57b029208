//! `reportflow-signer`: time-limited signed URLs for artifacts.
//!
//! Stateless: a URL embeds its expiry and an HMAC-SHA256 code over
//! `(resource, expiry)`; verification recomputes the code, so the same
//! resource can be reissued any number of times without storage. The secret
//! is read-only process configuration and is never logged or serialized.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use reportflow_core::{EngineError, EngineResult};

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies signed artifact URLs, and signs webhook payloads with
/// the same keyed-MAC scheme.
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    // keep the secret out of logs and debug dumps
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            secret: secret.into(),
            base_url,
        }
    }

    /// Issue a URL for `resource`, valid for `ttl` from `now`.
    pub fn issue(&self, resource: &str, ttl: Duration, now: DateTime<Utc>) -> String {
        let resource = resource.trim_start_matches('/');
        let expires = (now + ttl).timestamp();
        let signature = self.signature(resource, expires);
        format!(
            "{}/{}?expires={}&signature={}",
            self.base_url, resource, expires, signature
        )
    }

    /// Verify a signed URL, returning the resource reference it grants.
    ///
    /// The signature is checked before the expiry so a tampered URL is always
    /// reported as `InvalidSignature`, even when its claimed expiry has
    /// passed.
    pub fn verify(&self, url: &str, now: DateTime<Utc>) -> EngineResult<String> {
        let (resource, expires, signature) = self.parse(url)?;

        let mut mac = self.mac();
        mac.update(mac_input(&resource, expires).as_bytes());
        let raw = hex::decode(&signature).map_err(|_| EngineError::InvalidSignature)?;
        mac.verify_slice(&raw)
            .map_err(|_| EngineError::InvalidSignature)?;

        if now.timestamp() > expires {
            return Err(EngineError::TokenExpired);
        }
        Ok(resource)
    }

    /// Hex-encoded MAC over an arbitrary payload. The webhook channel signs
    /// its manifests with this, sharing the URL scheme's key.
    pub fn sign_payload(&self, payload: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
    }

    fn signature(&self, resource: &str, expires: i64) -> String {
        let mut mac = self.mac();
        mac.update(mac_input(resource, expires).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn parse(&self, url: &str) -> EngineResult<(String, i64, String)> {
        let rest = url
            .strip_prefix(&self.base_url)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or(EngineError::InvalidSignature)?;

        let (resource, query) = rest.split_once('?').ok_or(EngineError::InvalidSignature)?;

        let mut expires = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse::<i64>().ok(),
                Some(("signature", v)) => signature = Some(v.to_string()),
                _ => {}
            }
        }

        match (expires, signature) {
            (Some(expires), Some(signature)) => Ok((resource.to_string(), expires, signature)),
            _ => Err(EngineError::InvalidSignature),
        }
    }
}

fn mac_input(resource: &str, expires: i64) -> String {
    format!("{resource}\n{expires}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> UrlSigner {
        UrlSigner::new(*b"test-secret-key", "https://files.example.com")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn verify_accepts_fresh_url() {
        let signer = signer();
        let url = signer.issue("artifacts/rep-1/june.pdf", Duration::hours(1), now());

        let resource = signer.verify(&url, now()).unwrap();
        assert_eq!(resource, "artifacts/rep-1/june.pdf");
    }

    #[test]
    fn verify_rejects_expired_url() {
        let signer = signer();
        let url = signer.issue("artifacts/a.csv", Duration::hours(1), now());

        assert_eq!(
            signer.verify(&url, now() + Duration::hours(2)),
            Err(EngineError::TokenExpired)
        );
        // one second inside the window is still fine
        assert!(
            signer
                .verify(&url, now() + Duration::minutes(59))
                .is_ok()
        );
    }

    #[test]
    fn verify_rejects_tampered_resource() {
        let signer = signer();
        let url = signer.issue("artifacts/a.csv", Duration::hours(1), now());
        let tampered = url.replace("a.csv", "b.csv");

        assert_eq!(
            signer.verify(&tampered, now()),
            Err(EngineError::InvalidSignature)
        );
    }

    #[test]
    fn verify_rejects_tampered_expiry() {
        let signer = signer();
        let url = signer.issue("artifacts/a.csv", Duration::hours(1), now());
        let expires = (now() + Duration::hours(1)).timestamp();
        let stretched = url.replace(
            &format!("expires={expires}"),
            &format!("expires={}", expires + 86_400),
        );

        assert_eq!(
            signer.verify(&stretched, now()),
            Err(EngineError::InvalidSignature)
        );
    }

    #[test]
    fn verify_rejects_malformed_urls() {
        let signer = signer();
        for url in [
            "https://other.example.com/a?expires=1&signature=00",
            "https://files.example.com/a",
            "https://files.example.com/a?signature=00",
            "https://files.example.com/a?expires=notanumber&signature=00",
            "https://files.example.com/a?expires=1&signature=zz",
        ] {
            assert_eq!(
                signer.verify(url, now()),
                Err(EngineError::InvalidSignature),
                "url: {url}"
            );
        }
    }

    #[test]
    fn reissue_is_deterministic_given_time() {
        let signer = signer();
        let a = signer.issue("r", Duration::hours(24), now());
        let b = signer.issue("r", Duration::hours(24), now());
        assert_eq!(a, b);
    }

    #[test]
    fn payload_signature_changes_with_payload() {
        let signer = signer();
        let sig_a = signer.sign_payload(b"{\"event\":\"report.completed\"}");
        let sig_b = signer.sign_payload(b"{\"event\":\"report.failed\"}");
        assert_ne!(sig_a, sig_b);
        assert_eq!(sig_a.len(), 64); // hex SHA-256
    }

    #[test]
    fn debug_never_prints_secret() {
        let text = format!("{:?}", signer());
        assert!(!text.contains("test-secret-key"));
    }
}
