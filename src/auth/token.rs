//! Opaque bearer tokens.

use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE32_NOPAD;
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::AuthError;

/// Only scope issued today.
pub const SCOPE_AUTHENTICATION: &str = "authentication";

/// Random bytes behind every token.
pub const TOKEN_BYTES: usize = 16;

/// Encoded length of [`TOKEN_BYTES`] in unpadded base32.
pub const TOKEN_LENGTH: usize = 26;

/// Freshly minted token. `plain_text` leaves the server exactly once, in the
/// login response; storage only ever sees `hash`.
#[derive(Clone, Serialize, ToSchema)]
pub struct AuthToken {
    #[serde(rename = "token")]
    pub plain_text: String,
    #[serde(skip)]
    pub user_id: i64,
    #[serde(skip)]
    pub hash: Vec<u8>,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: String,
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("plain_text", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl AuthToken {
    /// Whether the token has lapsed at `now`; `expiry` itself is already invalid.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}

/// Mint a token for `user_id` valid for `ttl`.
///
/// # Errors
/// Returns `AuthError::Entropy` when the OS random source fails.
pub fn generate(user_id: i64, ttl: Duration, scope: &str) -> Result<AuthToken, AuthError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(AuthError::Entropy)?;

    let plain_text = BASE32_NOPAD.encode(&bytes);
    let hash = hash_token(&plain_text);

    Ok(AuthToken {
        plain_text,
        user_id,
        hash,
        expiry: Utc::now() + ttl,
        scope: scope.to_string(),
    })
}

/// SHA-256 of the token text, the only form that is persisted.
#[must_use]
pub fn hash_token(plain_text: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(plain_text.as_bytes());
    hasher.finalize().to_vec()
}
