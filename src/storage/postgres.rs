//! Postgres implementation of the store traits (schema in `sql/schema.sql`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{info_span, Instrument, Span};

use super::{
    models::{Customer, NewUser, Order, Page, PageRequest, Transaction, User, UserUpdate, Widget},
    with_timeout, OrderStore, StoreError, UserStore,
};
use crate::auth::{AuthToken, TokenStore};

fn db_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
    }
}

fn widget_from_row(row: &PgRow) -> Widget {
    Widget {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        inventory_level: row.get("inventory_level"),
        price: row.get("price"),
        image: row.get("image"),
        is_recurring: row.get("is_recurring"),
        plan_id: row.get("plan_id"),
    }
}

fn transaction_from_row(row: &PgRow) -> Transaction {
    Transaction {
        id: row.get("id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        last_four: row.get("last_four"),
        expiry_month: row.get("expiry_month"),
        expiry_year: row.get("expiry_year"),
        payment_intent: row.get("payment_intent"),
        payment_method: row.get("payment_method"),
        bank_return_code: row.get("bank_return_code"),
        transaction_status_id: row.get("transaction_status_id"),
    }
}

/// Columns selected for an order joined with its widget, transaction and customer.
macro_rules! order_select {
    () => {
        r"
        SELECT
            o.id, o.widget_id, o.transaction_id, o.customer_id, o.status_id,
            o.quantity, o.amount, o.created_at,
            w.name AS w_name, w.description AS w_description,
            w.inventory_level AS w_inventory_level, w.price AS w_price,
            w.image AS w_image, w.is_recurring AS w_is_recurring, w.plan_id AS w_plan_id,
            t.amount AS t_amount, t.currency AS t_currency, t.last_four AS t_last_four,
            t.expiry_month AS t_expiry_month, t.expiry_year AS t_expiry_year,
            t.payment_intent AS t_payment_intent, t.payment_method AS t_payment_method,
            t.bank_return_code AS t_bank_return_code,
            t.transaction_status_id AS t_transaction_status_id,
            c.first_name AS c_first_name, c.last_name AS c_last_name, c.email AS c_email
        FROM orders o
        JOIN widgets w ON w.id = o.widget_id
        JOIN transactions t ON t.id = o.transaction_id
        JOIN customers c ON c.id = o.customer_id
        "
    };
}

fn order_from_row(row: &PgRow) -> Order {
    let widget_id: i64 = row.get("widget_id");
    let transaction_id: i64 = row.get("transaction_id");
    let customer_id: i64 = row.get("customer_id");
    Order {
        id: row.get("id"),
        widget_id,
        transaction_id,
        customer_id,
        status_id: row.get("status_id"),
        quantity: row.get("quantity"),
        amount: row.get("amount"),
        created_at: row.get("created_at"),
        widget: Widget {
            id: widget_id,
            name: row.get("w_name"),
            description: row.get("w_description"),
            inventory_level: row.get("w_inventory_level"),
            price: row.get("w_price"),
            image: row.get("w_image"),
            is_recurring: row.get("w_is_recurring"),
            plan_id: row.get("w_plan_id"),
        },
        transaction: Transaction {
            id: transaction_id,
            amount: row.get("t_amount"),
            currency: row.get("t_currency"),
            last_four: row.get("t_last_four"),
            expiry_month: row.get("t_expiry_month"),
            expiry_year: row.get("t_expiry_year"),
            payment_intent: row.get("t_payment_intent"),
            payment_method: row.get("t_payment_method"),
            bank_return_code: row.get("t_bank_return_code"),
            transaction_status_id: row.get("t_transaction_status_id"),
        },
        customer: Customer {
            id: customer_id,
            first_name: row.get("c_first_name"),
            last_name: row.get("c_last_name"),
            email: row.get("c_email"),
        },
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn delete_tokens_for_user(&self, user_id: i64) -> Result<(), StoreError> {
        let query = "DELETE FROM tokens WHERE user_id = $1";
        with_timeout(async {
            sqlx::query(query)
                .bind(user_id)
                .execute(&self.pool)
                .instrument(db_span("DELETE", query))
                .await?;
            Ok(())
        })
        .await
    }

    async fn insert_token(&self, token: &AuthToken) -> Result<(), StoreError> {
        let query = "INSERT INTO tokens (user_id, token_hash, scope, expiry) VALUES ($1, $2, $3, $4)";
        with_timeout(async {
            sqlx::query(query)
                .bind(token.user_id)
                .bind(&token.hash)
                .bind(&token.scope)
                .bind(token.expiry)
                .execute(&self.pool)
                .instrument(db_span("INSERT", query))
                .await?;
            Ok(())
        })
        .await
    }

    async fn find_user_by_valid_token_hash(
        &self,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let query = r"
            SELECT u.id, u.first_name, u.last_name, u.email, u.password_hash
            FROM users u
            JOIN tokens t ON t.user_id = u.id
            WHERE t.token_hash = $1
              AND t.expiry > $2
            LIMIT 1
        ";
        with_timeout(async {
            let row = sqlx::query(query)
                .bind(hash)
                .bind(now)
                .fetch_optional(&self.pool)
                .instrument(db_span("SELECT", query))
                .await?;
            Ok(row.as_ref().map(user_from_row))
        })
        .await
    }

    async fn replace_tokens(&self, token: &AuthToken) -> Result<(), StoreError> {
        let delete = "DELETE FROM tokens WHERE user_id = $1";
        let insert =
            "INSERT INTO tokens (user_id, token_hash, scope, expiry) VALUES ($1, $2, $3, $4)";
        with_timeout(async {
            // Rotation is all or nothing: the old tokens survive a failed insert.
            let mut tx = self.pool.begin().await?;
            sqlx::query(delete)
                .bind(token.user_id)
                .execute(&mut *tx)
                .instrument(db_span("DELETE", delete))
                .await?;
            sqlx::query(insert)
                .bind(token.user_id)
                .bind(&token.hash)
                .bind(&token.scope)
                .bind(token.expiry)
                .execute(&mut *tx)
                .instrument(db_span("INSERT", insert))
                .await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = "SELECT id, first_name, last_name, email, password_hash FROM users WHERE email = $1";
        let email = email.trim().to_lowercase();
        with_timeout(async {
            let row = sqlx::query(query)
                .bind(&email)
                .fetch_optional(&self.pool)
                .instrument(db_span("SELECT", query))
                .await?;
            Ok(row.as_ref().map(user_from_row))
        })
        .await
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let query = "SELECT id, first_name, last_name, email, password_hash FROM users WHERE id = $1";
        with_timeout(async {
            let row = sqlx::query(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .instrument(db_span("SELECT", query))
                .await?;
            Ok(row.as_ref().map(user_from_row))
        })
        .await
    }

    async fn list_users(&self, page: PageRequest) -> Result<Page<User>, StoreError> {
        let query = r"
            SELECT id, first_name, last_name, email, password_hash
            FROM users
            ORDER BY last_name, first_name
            LIMIT $1 OFFSET $2
        ";
        let count = "SELECT COUNT(*) AS total FROM users";
        with_timeout(async {
            let rows = sqlx::query(query)
                .bind(page.page_size)
                .bind(page.offset().unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .instrument(db_span("SELECT", query))
                .await?;
            let total: i64 = sqlx::query(count)
                .fetch_one(&self.pool)
                .instrument(db_span("SELECT", count))
                .await?
                .get("total");
            Ok(Page::new(page, total, rows.iter().map(user_from_row).collect()))
        })
        .await
    }

    async fn insert_user(&self, user: NewUser) -> Result<i64, StoreError> {
        let query = r"
            INSERT INTO users (first_name, last_name, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id
        ";
        with_timeout(async {
            let row = sqlx::query(query)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(user.email.trim().to_lowercase())
                .bind(&user.password_hash)
                .fetch_one(&self.pool)
                .instrument(db_span("INSERT", query))
                .await
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        StoreError::Conflict("user")
                    } else {
                        StoreError::Database(err)
                    }
                })?;
            Ok(row.get("id"))
        })
        .await
    }

    async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<(), StoreError> {
        // Unset fields keep their current value.
        let query = r"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                updated_at = NOW()
            WHERE id = $1
        ";
        let email = update.email.as_deref().map(|e| e.trim().to_lowercase());
        with_timeout(async {
            let result = sqlx::query(query)
                .bind(id)
                .bind(update.first_name.as_deref())
                .bind(update.last_name.as_deref())
                .bind(email.as_deref())
                .execute(&self.pool)
                .instrument(db_span("UPDATE", query))
                .await
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        StoreError::Conflict("user")
                    } else {
                        StoreError::Database(err)
                    }
                })?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
        .await
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
        with_timeout(async {
            let result = sqlx::query(query)
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .instrument(db_span("UPDATE", query))
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
        .await
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let tokens = "DELETE FROM tokens WHERE user_id = $1";
        let users = "DELETE FROM users WHERE id = $1";
        with_timeout(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(tokens)
                .bind(id)
                .execute(&mut *tx)
                .instrument(db_span("DELETE", tokens))
                .await?;
            let result = sqlx::query(users)
                .bind(id)
                .execute(&mut *tx)
                .instrument(db_span("DELETE", users))
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("user"));
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let query = "SELECT 1";
        with_timeout(async {
            sqlx::query(query)
                .execute(&self.pool)
                .instrument(db_span("SELECT", query))
                .await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn get_widget(&self, id: i64) -> Result<Option<Widget>, StoreError> {
        let query = r"
            SELECT id, name, description, inventory_level, price, image, is_recurring, plan_id
            FROM widgets
            WHERE id = $1
        ";
        with_timeout(async {
            let row = sqlx::query(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .instrument(db_span("SELECT", query))
                .await?;
            Ok(row.as_ref().map(widget_from_row))
        })
        .await
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<i64, StoreError> {
        let query = r"
            INSERT INTO customers (first_name, last_name, email)
            VALUES ($1, $2, $3)
            RETURNING id
        ";
        with_timeout(async {
            let row = sqlx::query(query)
                .bind(&customer.first_name)
                .bind(&customer.last_name)
                .bind(&customer.email)
                .fetch_one(&self.pool)
                .instrument(db_span("INSERT", query))
                .await?;
            Ok(row.get("id"))
        })
        .await
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<i64, StoreError> {
        let query = r"
            INSERT INTO transactions
                (amount, currency, last_four, expiry_month, expiry_year, payment_intent,
                 payment_method, bank_return_code, transaction_status_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
        ";
        with_timeout(async {
            let row = sqlx::query(query)
                .bind(transaction.amount)
                .bind(&transaction.currency)
                .bind(&transaction.last_four)
                .bind(transaction.expiry_month)
                .bind(transaction.expiry_year)
                .bind(&transaction.payment_intent)
                .bind(&transaction.payment_method)
                .bind(&transaction.bank_return_code)
                .bind(transaction.transaction_status_id)
                .fetch_one(&self.pool)
                .instrument(db_span("INSERT", query))
                .await?;
            Ok(row.get("id"))
        })
        .await
    }

    async fn insert_order(&self, order: &Order) -> Result<i64, StoreError> {
        let query = r"
            INSERT INTO orders
                (widget_id, transaction_id, customer_id, status_id, quantity, amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
        ";
        with_timeout(async {
            let row = sqlx::query(query)
                .bind(order.widget_id)
                .bind(order.transaction_id)
                .bind(order.customer_id)
                .bind(order.status_id)
                .bind(order.quantity)
                .bind(order.amount)
                .fetch_one(&self.pool)
                .instrument(db_span("INSERT", query))
                .await?;
            Ok(row.get("id"))
        })
        .await
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let query = concat!(order_select!(), "WHERE o.id = $1");
        with_timeout(async {
            let row = sqlx::query(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .instrument(db_span("SELECT", query))
                .await?;
            Ok(row.as_ref().map(order_from_row))
        })
        .await
    }

    async fn list_orders(
        &self,
        recurring: bool,
        page: PageRequest,
    ) -> Result<Page<Order>, StoreError> {
        let query = concat!(
            order_select!(),
            "WHERE w.is_recurring = $1 ORDER BY o.created_at DESC, o.id DESC LIMIT $2 OFFSET $3"
        );
        let count = r"
            SELECT COUNT(*) AS total
            FROM orders o
            JOIN widgets w ON w.id = o.widget_id
            WHERE w.is_recurring = $1
        ";
        with_timeout(async {
            let rows = sqlx::query(query)
                .bind(recurring)
                .bind(page.page_size)
                .bind(page.offset().unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .instrument(db_span("SELECT", query))
                .await?;
            let total: i64 = sqlx::query(count)
                .bind(recurring)
                .fetch_one(&self.pool)
                .instrument(db_span("SELECT", count))
                .await?
                .get("total");
            Ok(Page::new(page, total, rows.iter().map(order_from_row).collect()))
        })
        .await
    }

    async fn get_transaction_by_payment_intent(
        &self,
        payment_intent: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let query = r"
            SELECT id, amount, currency, last_four, expiry_month, expiry_year, payment_intent,
                   payment_method, bank_return_code, transaction_status_id
            FROM transactions
            WHERE payment_intent = $1
            ORDER BY id
            LIMIT 1
        ";
        with_timeout(async {
            let row = sqlx::query(query)
                .bind(payment_intent)
                .fetch_optional(&self.pool)
                .instrument(db_span("SELECT", query))
                .await?;
            Ok(row.as_ref().map(transaction_from_row))
        })
        .await
    }

    async fn update_order_status(&self, id: i64, status_id: i32) -> Result<(), StoreError> {
        let query = "UPDATE orders SET status_id = $2, updated_at = NOW() WHERE id = $1";
        with_timeout(async {
            let result = sqlx::query(query)
                .bind(id)
                .bind(status_id)
                .execute(&self.pool)
                .instrument(db_span("UPDATE", query))
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("order"));
            }
            Ok(())
        })
        .await
    }
}
