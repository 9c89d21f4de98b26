//! Tamper-evident, self-expiring links.
//!
//! A signed link is `<url>{?|&}timestamp=<unix>&signature=<hex>` where the
//! signature is HMAC-SHA-256 over everything before `&signature=`. Signature
//! and age are independent checks: a stale link still verifies.

use chrono::{DateTime, Utc};
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TIMESTAMP_PARAM: &str = "timestamp";
const SIGNATURE_MARKER: &str = "&signature=";

#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl UrlSigner {
    /// # Errors
    /// Returns an error if the HMAC cannot be keyed with `secret`.
    pub fn new(secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    /// Sign `raw_url` with the current time embedded.
    #[must_use]
    pub fn sign(&self, raw_url: &str) -> String {
        self.sign_at(raw_url, Utc::now())
    }

    #[must_use]
    pub fn sign_at(&self, raw_url: &str, now: DateTime<Utc>) -> String {
        let separator = if raw_url.contains('?') { '&' } else { '?' };
        let unsigned = format!(
            "{raw_url}{separator}{TIMESTAMP_PARAM}={}",
            now.timestamp()
        );
        let signature = hex::encode(self.signature(&unsigned));
        format!("{unsigned}{SIGNATURE_MARKER}{signature}")
    }

    /// Check the trailing signature of `candidate` in constant time.
    ///
    /// Never fails: anything malformed is simply not valid.
    #[must_use]
    pub fn verify(&self, candidate: &str) -> bool {
        let Some(index) = candidate.rfind(SIGNATURE_MARKER) else {
            return false;
        };
        let (unsigned, rest) = candidate.split_at(index);
        let Ok(signature) = hex::decode(&rest[SIGNATURE_MARKER.len()..]) else {
            return false;
        };

        self.mac
            .clone()
            .chain_update(unsigned.as_bytes())
            .verify_slice(&signature)
            .is_ok()
    }

    /// True when the embedded timestamp is older than `max_age_minutes`.
    ///
    /// A link without a readable timestamp is treated as expired.
    #[must_use]
    pub fn is_expired(&self, candidate: &str, max_age_minutes: i64) -> bool {
        is_expired_at(candidate, max_age_minutes, Utc::now())
    }

    fn signature(&self, unsigned: &str) -> Vec<u8> {
        self.mac
            .clone()
            .chain_update(unsigned.as_bytes())
            .finalize()
            .into_bytes()
            .to_vec()
    }
}

/// Clock-injected variant of [`UrlSigner::is_expired`].
#[must_use]
pub fn is_expired_at(candidate: &str, max_age_minutes: i64, now: DateTime<Utc>) -> bool {
    let Some(signed_at) = timestamp(candidate) else {
        return true;
    };
    // Whole seconds on both sides, the link only carries second precision.
    now.timestamp().saturating_sub(signed_at) > max_age_minutes.saturating_mul(60)
}

/// Value of a query parameter of `url`, percent-decoded.
#[must_use]
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .last()
}

fn timestamp(candidate: &str) -> Option<i64> {
    query_param(candidate, TIMESTAMP_PARAM)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &[u8] = b"abcdefghijklmnopqrstuvwxyz012345";
    const RESET_URL: &str = "https://example.com/reset-password?email=abc";

    fn signer() -> UrlSigner {
        UrlSigner::new(SECRET).expect("hmac key")
    }

    #[test]
    fn signed_link_verifies() {
        let signed = signer().sign(RESET_URL);
        assert!(signed.starts_with("https://example.com/reset-password?email=abc&timestamp="));
        assert!(signed.contains("&signature="));
        assert!(signer().verify(&signed));
    }

    #[test]
    fn uses_question_mark_without_query() {
        let signed = signer().sign("https://example.com/reset-password");
        assert!(signed.starts_with("https://example.com/reset-password?timestamp="));
        assert!(signer().verify(&signed));
    }

    #[test]
    fn fresh_link_is_not_expired() {
        let signed = signer().sign(RESET_URL);
        assert!(!signer().is_expired(&signed, 60));
    }

    #[test]
    fn stale_link_still_verifies() {
        let now = Utc::now();
        let signed = signer().sign_at(RESET_URL, now);
        let later = now + Duration::minutes(61);

        assert!(is_expired_at(&signed, 60, later));
        assert!(signer().verify(&signed));
    }

    #[test]
    fn link_at_max_age_is_not_expired() {
        let now = Utc::now();
        let signed = signer().sign_at(RESET_URL, now);
        assert!(!is_expired_at(&signed, 60, now + Duration::minutes(60)));
        assert!(is_expired_at(
            &signed,
            60,
            now + Duration::minutes(60) + Duration::seconds(1)
        ));
    }

    #[test]
    fn sub_second_clock_does_not_expire_early() {
        let signed_at = DateTime::from_timestamp(1_700_000_000, 999_000_000).expect("timestamp");
        let signed = signer().sign_at(RESET_URL, signed_at);
        let checked_at =
            DateTime::from_timestamp(1_700_003_600, 999_999_999).expect("timestamp");
        assert!(!is_expired_at(&signed, 60, checked_at));
    }

    #[test]
    fn huge_max_age_does_not_overflow() {
        let signed = signer().sign_at(RESET_URL, Utc::now());
        assert!(!is_expired_at(&signed, i64::MAX, Utc::now()));
        assert!(is_expired_at(&signed, 0, Utc::now() + Duration::seconds(2)));
    }

    #[test]
    fn altered_character_fails_verification() {
        let signed = signer().sign(RESET_URL);
        let signature_at = signed.rfind("&signature=").expect("marker") + "&signature=".len();
        let timestamp_at = signed.find("timestamp=").expect("timestamp") + "timestamp=".len();
        let path_at = signed.find("reset").expect("path");

        for index in [signature_at, timestamp_at, path_at, signed.len() - 1] {
            let mut bytes = signed.clone().into_bytes();
            bytes[index] = if bytes[index] == b'1' { b'2' } else { b'1' };
            let tampered = String::from_utf8(bytes).expect("ascii");
            assert!(!signer().verify(&tampered), "accepted tampered link {tampered}");
        }
    }

    #[test]
    fn other_secret_fails_verification() {
        let signed = signer().sign(RESET_URL);
        let other = UrlSigner::new(b"another secret").expect("hmac key");
        assert!(!other.verify(&signed));
    }

    #[test]
    fn malformed_links_are_rejected() {
        let signer = signer();
        assert!(!signer.verify(""));
        assert!(!signer.verify(RESET_URL));
        assert!(!signer.verify("https://example.com/?a=b&signature=zz"));
        assert!(!signer.verify("&signature="));
    }

    #[test]
    fn missing_timestamp_counts_as_expired() {
        assert!(signer().is_expired(RESET_URL, 60));
        assert!(signer().is_expired("https://example.com/?timestamp=soon", 60));
    }

    #[test]
    fn query_param_decodes_values() {
        let url = "https://example.com/reset-password?email=a%2Bb%3D%3D&timestamp=1";
        assert_eq!(query_param(url, "email").as_deref(), Some("a+b=="));
        assert_eq!(query_param(url, "missing"), None);
    }

    #[test]
    fn debug_redacts_secret() {
        assert!(format!("{:?}", signer()).contains("REDACTED"));
    }
}
