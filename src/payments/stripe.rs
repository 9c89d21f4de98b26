//! Stripe REST client (form-encoded requests, JSON responses).

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{
    PaymentError, PaymentIntent, PaymentMethod, PaymentProcessor, ProcessorCustomer, Subscription,
};
use crate::APP_USER_AGENT;

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Translate an error response into a [`PaymentError`].
fn map_error(status: StatusCode, body: &str) -> PaymentError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .unwrap_or_default()
        .error;
    let message = detail
        .message
        .unwrap_or_else(|| format!("unexpected status {status}"));

    match detail.kind.as_str() {
        "card_error" => PaymentError::Card {
            code: detail.code.unwrap_or_else(|| "card_error".to_string()),
            message,
        },
        "invalid_request_error" => PaymentError::InvalidRequest(message),
        _ => PaymentError::Api(message),
    }
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret: SecretString,
}

impl StripeClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(secret: SecretString) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            secret,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, PaymentError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(%method, %url, "stripe request");

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.secret.expose_secret());
        if !form.is_empty() {
            request = request.form(form);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_error(status, &body))
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[instrument(skip(self))]
    async fn create_payment_intent(
        &self,
        currency: &str,
        amount: i64,
    ) -> Result<PaymentIntent, PaymentError> {
        let form = [
            ("amount", amount.to_string()),
            ("currency", currency.to_string()),
        ];
        self.call(Method::POST, "payment_intents", &form).await
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
        self.call(Method::GET, &format!("payment_intents/{id}"), &[])
            .await
    }

    #[instrument(skip(self))]
    async fn get_payment_method(&self, id: &str) -> Result<PaymentMethod, PaymentError> {
        self.call(Method::GET, &format!("payment_methods/{id}"), &[])
            .await
    }

    #[instrument(skip(self, email))]
    async fn create_customer(
        &self,
        payment_method: &str,
        email: &str,
    ) -> Result<ProcessorCustomer, PaymentError> {
        let form = [
            ("payment_method", payment_method.to_string()),
            ("email", email.to_string()),
            (
                "invoice_settings[default_payment_method]",
                payment_method.to_string(),
            ),
        ];
        self.call(Method::POST, "customers", &form).await
    }

    #[instrument(skip(self, customer), fields(customer = %customer.id))]
    async fn subscribe_to_plan(
        &self,
        customer: &ProcessorCustomer,
        plan: &str,
        last_four: &str,
        card_type: &str,
    ) -> Result<Subscription, PaymentError> {
        let form = [
            ("customer", customer.id.clone()),
            ("items[0][plan]", plan.to_string()),
            ("metadata[last_four]", last_four.to_string()),
            ("metadata[card_type]", card_type.to_string()),
            ("expand[]", "latest_invoice.payment_intent".to_string()),
        ];
        self.call(Method::POST, "subscriptions", &form).await
    }

    #[instrument(skip(self))]
    async fn refund(&self, payment_intent: &str, amount: i64) -> Result<(), PaymentError> {
        let form = [
            ("payment_intent", payment_intent.to_string()),
            ("amount", amount.to_string()),
        ];
        self.call::<serde_json::Value>(Method::POST, "refunds", &form)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), PaymentError> {
        self.call::<serde_json::Value>(
            Method::DELETE,
            &format!("subscriptions/{subscription_id}"),
            &[],
        )
        .await?;
        Ok(())
    }
}
