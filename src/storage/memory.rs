//! In-process store used by tests and local runs without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{
    models::{Customer, NewUser, Order, Page, PageRequest, Transaction, User, UserUpdate, Widget},
    OrderStore, StoreError, UserStore,
};
use crate::auth::{AuthToken, TokenStore};

#[derive(Debug)]
struct TokenRow {
    user_id: i64,
    hash: Vec<u8>,
    expiry: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    tokens: Vec<TokenRow>,
    widgets: BTreeMap<i64, Widget>,
    customers: BTreeMap<i64, Customer>,
    transactions: BTreeMap<i64, Transaction>,
    orders: BTreeMap<i64, Order>,
}

fn next_id<T>(table: &BTreeMap<i64, T>) -> i64 {
    table.keys().next_back().map_or(1, |id| id + 1)
}

fn paginate<T: Clone>(rows: &[T], page: PageRequest) -> Page<T> {
    let total = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    let start = page
        .offset()
        .and_then(|offset| usize::try_from(offset).ok())
        .unwrap_or(usize::MAX);
    let size = usize::try_from(page.page_size).unwrap_or(0);
    let data = rows.iter().skip(start).take(size).cloned().collect();
    Page::new(page, total, data)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalogue entry; the id is assigned when `widget.id` is 0.
    pub async fn insert_widget(&self, mut widget: Widget) -> i64 {
        let mut tables = self.tables.write().await;
        if widget.id == 0 {
            widget.id = next_id(&tables.widgets);
        }
        let id = widget.id;
        tables.widgets.insert(id, widget);
        id
    }

    /// Number of stored tokens held by `user_id`.
    pub async fn token_count(&self, user_id: i64) -> usize {
        self.tables
            .read()
            .await
            .tokens
            .iter()
            .filter(|row| row.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn delete_tokens_for_user(&self, user_id: i64) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .tokens
            .retain(|row| row.user_id != user_id);
        Ok(())
    }

    async fn insert_token(&self, token: &AuthToken) -> Result<(), StoreError> {
        self.tables.write().await.tokens.push(TokenRow {
            user_id: token.user_id,
            hash: token.hash.clone(),
            expiry: token.expiry,
        });
        Ok(())
    }

    async fn find_user_by_valid_token_hash(
        &self,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .iter()
            .find(|row| row.hash == hash && row.expiry > now)
            .and_then(|row| tables.users.get(&row.user_id).cloned()))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self, page: PageRequest) -> Result<Page<User>, StoreError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(paginate(&users, page))
    }

    async fn insert_user(&self, user: NewUser) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let email = user.email.trim().to_lowercase();
        if tables.users.values().any(|existing| existing.email == email) {
            return Err(StoreError::Conflict("user"));
        }
        let id = next_id(&tables.users);
        tables.users.insert(
            id,
            User {
                id,
                first_name: user.first_name,
                last_name: user.last_name,
                email,
                password_hash: user.password_hash,
            },
        );
        Ok(id)
    }

    async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let mut user = tables
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))?;
        update.apply(&mut user);
        if tables
            .users
            .values()
            .any(|other| other.id != id && other.email == user.email)
        {
            return Err(StoreError::Conflict("user"));
        }
        tables.users.insert(id, user);
        Ok(())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
        password_hash.clone_into(&mut user.password_hash);
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .users
            .remove(&id)
            .ok_or(StoreError::NotFound("user"))?;
        tables.tokens.retain(|row| row.user_id != id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get_widget(&self, id: i64) -> Result<Option<Widget>, StoreError> {
        Ok(self.tables.read().await.widgets.get(&id).cloned())
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let id = next_id(&tables.customers);
        let mut customer = customer.clone();
        customer.id = id;
        tables.customers.insert(id, customer);
        Ok(id)
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let id = next_id(&tables.transactions);
        let mut transaction = transaction.clone();
        transaction.id = id;
        tables.transactions.insert(id, transaction);
        Ok(id)
    }

    async fn insert_order(&self, order: &Order) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let id = next_id(&tables.orders);
        let mut order = order.clone();
        order.id = id;
        order.created_at = Some(order.created_at.unwrap_or_else(Utc::now));
        tables.orders.insert(id, order);
        Ok(id)
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).map(|order| tables.hydrate(order)))
    }

    async fn list_orders(
        &self,
        recurring: bool,
        page: PageRequest,
    ) -> Result<Page<Order>, StoreError> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .map(|order| tables.hydrate(order))
            .filter(|order| order.widget.id != 0 && order.widget.is_recurring == recurring)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(&orders, page))
    }

    async fn get_transaction_by_payment_intent(
        &self,
        payment_intent: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .transactions
            .values()
            .find(|txn| txn.payment_intent == payment_intent)
            .cloned())
    }

    async fn update_order_status(&self, id: i64, status_id: i32) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or(StoreError::NotFound("order"))?;
        order.status_id = status_id;
        Ok(())
    }
}

impl Tables {
    fn hydrate(&self, order: &Order) -> Order {
        let mut order = order.clone();
        order.widget = self.widgets.get(&order.widget_id).cloned().unwrap_or_default();
        order.transaction = self
            .transactions
            .get(&order.transaction_id)
            .cloned()
            .unwrap_or_default();
        order.customer = self
            .customers
            .get(&order.customer_id)
            .cloned()
            .unwrap_or_default();
        order
    }
}
