use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::token::AuthToken;
use crate::storage::{models::User, StoreError};

/// The storage operations token authentication relies on.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn delete_tokens_for_user(&self, user_id: i64) -> Result<(), StoreError>;

    /// Persists `token.hash`, `token.user_id`, `token.expiry` and `token.scope`.
    async fn insert_token(&self, token: &AuthToken) -> Result<(), StoreError>;

    /// User owning a token with this hash whose expiry is after `now`.
    async fn find_user_by_valid_token_hash(
        &self,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    /// Drop every token of the user, then store `token`.
    ///
    /// Repeating this after a partial failure is safe.
    async fn replace_tokens(&self, token: &AuthToken) -> Result<(), StoreError> {
        self.delete_tokens_for_user(token.user_id).await?;
        self.insert_token(token).await
    }
}
