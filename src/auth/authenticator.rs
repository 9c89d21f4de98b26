use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    store::TokenStore,
    token::{self, AuthToken, SCOPE_AUTHENTICATION, TOKEN_LENGTH},
    AuthError,
};
use crate::storage::models::User;

/// Default lifetime of a login token.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 12;

/// Issues bearer tokens and resolves them back to users.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn TokenStore>,
    ttl: Duration,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint and persist a login token for `user`, revoking earlier ones.
    ///
    /// # Errors
    /// `Entropy` if no token could be generated, `Store` if persisting failed.
    #[instrument(skip_all, fields(user_id = user.id))]
    pub async fn issue(&self, user: &User) -> Result<AuthToken, AuthError> {
        let token = token::generate(user.id, self.ttl, SCOPE_AUTHENTICATION)?;
        self.persist(&token).await?;
        debug!(expiry = %token.expiry, "issued authentication token");
        Ok(token)
    }

    /// Store `token` as the only token of its user.
    ///
    /// # Errors
    /// Any storage failure is returned, never swallowed.
    pub async fn persist(&self, token: &AuthToken) -> Result<(), AuthError> {
        self.store.replace_tokens(token).await?;
        Ok(())
    }

    /// Resolve an `Authorization` header value to its user.
    ///
    /// # Errors
    /// `MalformedHeader`, `InvalidTokenLength`, `NoMatchingUser` (unknown and
    /// expired tokens alike) or `Store`.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<User, AuthError> {
        self.authenticate_at(header, Utc::now()).await
    }

    #[instrument(skip_all)]
    pub async fn authenticate_at(
        &self,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let plain_text = bearer_token(header)?;
        let hash = token::hash_token(plain_text);

        self.store
            .find_user_by_valid_token_hash(&hash, now)
            .await?
            .ok_or(AuthError::NoMatchingUser)
    }
}

/// Extract the token from `Bearer <token>` and check its length.
///
/// # Errors
/// `MalformedHeader` when absent or not exactly two space separated parts,
/// `InvalidTokenLength` when the token is not [`TOKEN_LENGTH`] long.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.filter(|h| !h.is_empty()).ok_or(AuthError::MalformedHeader)?;

    let mut parts = header.split(' ');
    let (Some("Bearer"), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::MalformedHeader);
    };

    if token.len() != TOKEN_LENGTH {
        return Err(AuthError::InvalidTokenLength(token.len()));
    }

    Ok(token)
}
