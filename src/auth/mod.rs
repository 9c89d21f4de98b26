//! Bearer token authentication and password hashing.

pub mod authenticator;
pub mod password;
pub mod store;
pub mod token;

pub use authenticator::{bearer_token, Authenticator};
pub use store::TokenStore;
pub use token::{AuthToken, SCOPE_AUTHENTICATION, TOKEN_LENGTH};

use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header missing or not of the form `Bearer <token>`")]
    MalformedHeader,
    #[error("wrong size of an authentication token: {0}")]
    InvalidTokenLength(usize),
    #[error("no matching user found")]
    NoMatchingUser,
    #[error("failed to generate token")]
    Entropy(#[source] rand::Error),
    #[error("password hash error: {0}")]
    PasswordHash(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// True for failures caused by the server rather than the presented credentials.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Entropy(_) | Self::PasswordHash(_) | Self::Store(_)
        )
    }
}
