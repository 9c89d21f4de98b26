//! Persistence for users, tokens and the commerce records.
//!
//! Handlers depend on the [`UserStore`], [`OrderStore`] and
//! [`crate::auth::TokenStore`] traits; [`PgStore`] backs them with Postgres and
//! [`MemoryStore`] keeps everything in process for tests and local runs.

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use std::{future::Future, time::Duration};
use thiserror::Error;

use crate::auth::TokenStore;
use models::{
    Customer, NewUser, Order, Page, PageRequest, Transaction, User, UserUpdate, Widget,
};

/// Upper bound for a single database call.
pub const DB_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database call timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Run `fut` with the [`DB_TIMEOUT`] bound.
///
/// # Errors
/// Returns `StoreError::Timeout` when the bound is hit, otherwise the result of `fut`.
pub async fn with_timeout<T, F>(fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    with_deadline(DB_TIMEOUT, fut).await
}

async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Case-insensitive lookup.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn list_users(&self, page: PageRequest) -> Result<Page<User>, StoreError>;
    async fn insert_user(&self, user: NewUser) -> Result<i64, StoreError>;
    async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<(), StoreError>;
    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError>;
    /// Removes the user together with any tokens they hold.
    async fn delete_user(&self, id: i64) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_widget(&self, id: i64) -> Result<Option<Widget>, StoreError>;
    async fn insert_customer(&self, customer: &Customer) -> Result<i64, StoreError>;
    async fn insert_transaction(&self, transaction: &Transaction) -> Result<i64, StoreError>;
    async fn insert_order(&self, order: &Order) -> Result<i64, StoreError>;
    /// Order with its widget, transaction and customer filled in.
    async fn get_order(&self, id: i64) -> Result<Option<Order>, StoreError>;
    /// Orders whose widget is (or is not) recurring, newest first.
    async fn list_orders(&self, recurring: bool, page: PageRequest)
        -> Result<Page<Order>, StoreError>;
    async fn get_transaction_by_payment_intent(
        &self,
        payment_intent: &str,
    ) -> Result<Option<Transaction>, StoreError>;
    async fn update_order_status(&self, id: i64, status_id: i32) -> Result<(), StoreError>;
}

/// Everything the API server needs from persistence.
pub trait Store: TokenStore + UserStore + OrderStore {}

impl<T: TokenStore + UserStore + OrderStore> Store for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_passes_result_through() {
        let value = with_timeout(async { Ok::<_, StoreError>(5) }).await;
        assert!(matches!(value, Ok(5)));
    }

    #[tokio::test]
    async fn deadline_reports_timeout() {
        let value = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(())
        })
        .await;
        assert!(matches!(value, Err(StoreError::Timeout(_))));
    }
}
