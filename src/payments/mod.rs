//! Payment processor integration and the checkout flows built on it.

pub mod checkout;
pub mod stripe;

pub use checkout::{
    CancelRequest, Checkout, CheckoutError, CheckoutResponse, RefundRequest, SubscriptionRequest,
    TerminalPayment,
};
pub use stripe::StripeClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Declined or otherwise rejected card; the message is safe to show.
    #[error("{code}: {message}")]
    Card { code: String, message: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("payment processor error: {0}")]
    Api(String),
    #[error("payment processor unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl PaymentError {
    /// Text suitable for the customer, when the processor supplied one.
    #[must_use]
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Card { .. } => Some(self.to_string()),
            Self::InvalidRequest(message) => Some(message.clone()),
            Self::Api(_) | Self::Transport(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub latest_charge: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CardDetails {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub last4: String,
    #[serde(default)]
    pub exp_month: i32,
    #[serde(default)]
    pub exp_year: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethod {
    pub id: String,
    #[serde(default)]
    pub card: Option<CardDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

/// Operations the store needs from a card processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        currency: &str,
        amount: i64,
    ) -> Result<PaymentIntent, PaymentError>;

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError>;

    async fn get_payment_method(&self, id: &str) -> Result<PaymentMethod, PaymentError>;

    async fn create_customer(
        &self,
        payment_method: &str,
        email: &str,
    ) -> Result<ProcessorCustomer, PaymentError>;

    async fn subscribe_to_plan(
        &self,
        customer: &ProcessorCustomer,
        plan: &str,
        last_four: &str,
        card_type: &str,
    ) -> Result<Subscription, PaymentError>;

    async fn refund(&self, payment_intent: &str, amount: i64) -> Result<(), PaymentError>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), PaymentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_error_message_joins_code_and_text() {
        let err = PaymentError::Card {
            code: "card_declined".into(),
            message: "Your card was declined.".into(),
        };
        assert_eq!(
            err.user_message().as_deref(),
            Some("card_declined: Your card was declined.")
        );
        assert!(!matches!(err, PaymentError::InvalidRequest(_)));
    }

    #[test]
    fn api_errors_have_no_user_message() {
        assert!(PaymentError::Api("boom".into()).user_message().is_none());
    }
}
