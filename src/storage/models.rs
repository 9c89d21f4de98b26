use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Order status: payment cleared.
pub const ORDER_STATUS_CLEARED: i32 = 1;
/// Order status: charge refunded.
pub const ORDER_STATUS_REFUNDED: i32 = 2;
/// Order status: subscription cancelled.
pub const ORDER_STATUS_CANCELLED: i32 = 3;

/// Transaction status: cleared by the processor.
pub const TRANSACTION_STATUS_CLEARED: i32 = 2;

#[derive(Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Argon2 PHC string; never serialized back to clients.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Fields an administrator may change on an existing user.
///
/// Every field is optional; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl UserUpdate {
    pub fn apply(&self, user: &mut User) {
        if let Some(first_name) = &self.first_name {
            user.first_name.clone_from(first_name);
        }
        if let Some(last_name) = &self.last_name {
            user.last_name.clone_from(last_name);
        }
        if let Some(email) = &self.email {
            user.email = email.trim().to_lowercase();
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }
}

/// A user about to be created; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Widget {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub inventory_level: i32,
    /// Price in cents.
    pub price: i64,
    pub image: String,
    pub is_recurring: bool,
    pub plan_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Customer {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    pub id: i64,
    /// Amount in cents.
    pub amount: i64,
    pub currency: String,
    pub last_four: String,
    pub expiry_month: i32,
    pub expiry_year: i32,
    pub payment_intent: String,
    pub payment_method: String,
    pub bank_return_code: String,
    pub transaction_status_id: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: i64,
    pub widget_id: i64,
    pub transaction_id: i64,
    pub customer_id: i64,
    pub status_id: i32,
    pub quantity: i32,
    pub amount: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub widget: Widget,
    #[serde(default)]
    pub transaction: Transaction,
    #[serde(default)]
    pub customer: Customer,
}

/// Client-supplied paging window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct PageRequest {
    pub page_size: i64,
    pub current_page: i64,
}

impl PageRequest {
    /// Rows to skip before this page, `None` when the window does not fit an `i64`.
    #[must_use]
    pub const fn offset(&self) -> Option<i64> {
        match self.current_page.checked_sub(1) {
            Some(skipped) => skipped.checked_mul(self.page_size),
            None => None,
        }
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.page_size > 0 && self.current_page > 0 && self.offset().is_some()
    }
}

/// One page of records plus the totals needed to render a pager.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Page<T> {
    pub page_size: i64,
    pub current_page: i64,
    pub last_page: i64,
    pub total_records: i64,
    pub page_data: Vec<T>,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(request: PageRequest, total_records: i64, page_data: Vec<T>) -> Self {
        Self {
            page_size: request.page_size,
            current_page: request.current_page,
            last_page: last_page(total_records, request.page_size),
            total_records,
            page_data,
        }
    }
}

/// Number of the last page holding `total` records `page_size` at a time.
#[must_use]
pub const fn last_page(total: i64, page_size: i64) -> i64 {
    if page_size <= 0 {
        return 0;
    }
    let mut last = total / page_size;
    if total % page_size > 0 {
        last += 1;
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_rounds_up() {
        assert_eq!(last_page(0, 10), 0);
        assert_eq!(last_page(10, 10), 1);
        assert_eq!(last_page(11, 10), 2);
        assert_eq!(last_page(3, 0), 0);
    }

    #[test]
    fn page_offset() {
        let request = PageRequest {
            page_size: 5,
            current_page: 3,
        };
        assert_eq!(request.offset(), Some(10));
        assert!(request.is_valid());
        assert!(!PageRequest {
            page_size: 0,
            current_page: 1
        }
        .is_valid());
    }

    #[test]
    fn overflowing_window_is_invalid() {
        let request = PageRequest {
            page_size: i64::MAX / 2 + 1,
            current_page: 3,
        };
        assert_eq!(request.offset(), None);
        assert!(!request.is_valid());

        let first = PageRequest {
            page_size: i64::MAX,
            current_page: 1,
        };
        assert_eq!(first.offset(), Some(0));
        assert!(first.is_valid());
    }

    #[test]
    fn user_update_only_touches_present_fields() {
        let mut user = User {
            id: 7,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            password_hash: "hash".into(),
        };
        let update = UserUpdate {
            last_name: Some("Byron".into()),
            email: Some(" Ada@Example.COM ".into()),
            ..UserUpdate::default()
        };
        update.apply(&mut user);

        assert_eq!(user.first_name, "Ada");
        assert_eq!(user.last_name, "Byron");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.password_hash, "hash");
    }

    #[test]
    fn user_json_omits_password_hash() -> serde_json::Result<()> {
        let user = User {
            id: 1,
            password_hash: "secret-hash".into(),
            ..User::default()
        };
        let json = serde_json::to_string(&user)?;
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("password"));
        Ok(())
    }
}
