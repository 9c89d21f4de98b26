//! Order flows that span the processor, the store and the invoice service.
//!
//! Every flow is a straight sequence of fallible steps; the first failure ends
//! it and is returned as a [`CheckoutError`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use super::{PaymentError, PaymentProcessor};
use crate::{
    invoice::{InvoiceError, InvoiceOrder, InvoiceSender},
    storage::{
        models::{
            Customer, Order, Transaction, ORDER_STATUS_CANCELLED, ORDER_STATUS_CLEARED,
            ORDER_STATUS_REFUNDED, TRANSACTION_STATUS_CLEARED,
        },
        OrderStore, StoreError,
    },
};

pub const MSG_TRANSACTION_SUCCESSFUL: &str = "Transaction successful!";

/// Card checkout form for a recurring plan. Amounts and ids arrive as strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SubscriptionRequest {
    pub currency: String,
    pub amount: String,
    pub payment_method: String,
    pub email: String,
    pub card_brand: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub last_four: String,
    pub plan: String,
    pub product_id: String,
    pub first_name: String,
    pub last_name: String,
}

/// A charge completed in the back-office virtual terminal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TerminalPayment {
    pub amount: i64,
    pub currency: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub payment_intent: String,
    pub payment_method: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RefundRequest {
    /// Order id.
    pub id: i64,
    #[serde(rename = "pi")]
    pub payment_intent: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CancelRequest {
    /// Order id.
    pub id: i64,
    /// Subscription id, stored as the transaction's payment intent.
    #[serde(rename = "pi")]
    pub payment_intent: String,
    pub currency: String,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("error converting product id {0:?} to an integer")]
    InvalidProductId(String),
    #[error("error converting amount {0:?} to an integer")]
    InvalidAmount(String),
    #[error("error saving {0}: {1}")]
    Persistence(&'static str, #[source] StoreError),
    #[error(transparent)]
    Invoice(#[from] InvoiceError),
    #[error("no transaction for payment intent {0}")]
    UnknownPaymentIntent(String),
    #[error("wrong amount: {requested}; amount of transaction is {recorded}")]
    AmountMismatch { requested: i64, recorded: i64 },
    #[error("wrong currency: {requested:?}; currency of transaction is {recorded:?}")]
    CurrencyMismatch { requested: String, recorded: String },
    /// The processor accepted the change but the order status was not saved.
    #[error("the {0}, but the database could not be updated; please call support")]
    StatusNotRecorded(&'static str, #[source] StoreError),
}

impl CheckoutError {
    /// Text to show the customer: the processor's own wording when it has one.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Payment(err) => err.user_message().unwrap_or_else(|| err.to_string()),
            other => other.to_string(),
        }
    }
}

/// Outcome of a checkout, echoed to the storefront as-is.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub ok: bool,
    pub message: String,
}

impl CheckoutResponse {
    #[must_use]
    pub fn from_result(result: &Result<i64, CheckoutError>) -> Self {
        match result {
            Ok(_) => Self {
                ok: true,
                message: MSG_TRANSACTION_SUCCESSFUL.to_string(),
            },
            Err(err) => Self {
                ok: false,
                message: err.user_message(),
            },
        }
    }
}

#[derive(Clone)]
pub struct Checkout {
    processor: Arc<dyn PaymentProcessor>,
    orders: Arc<dyn OrderStore>,
    invoices: Arc<dyn InvoiceSender>,
}

impl std::fmt::Debug for Checkout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkout").finish_non_exhaustive()
    }
}

impl Checkout {
    #[must_use]
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        orders: Arc<dyn OrderStore>,
        invoices: Arc<dyn InvoiceSender>,
    ) -> Self {
        Self {
            processor,
            orders,
            invoices,
        }
    }

    #[must_use]
    pub fn processor(&self) -> &dyn PaymentProcessor {
        self.processor.as_ref()
    }

    /// Create the processor customer, subscribe it, record the order and
    /// request its invoice. Returns the new order id.
    ///
    /// # Errors
    /// The first failing step, unchanged.
    #[instrument(skip_all, fields(plan = %request.plan, product_id = %request.product_id))]
    pub async fn subscribe(&self, request: &SubscriptionRequest) -> Result<i64, CheckoutError> {
        let customer = self
            .processor
            .create_customer(&request.payment_method, &request.email)
            .await?;

        let subscription = self
            .processor
            .subscribe_to_plan(
                &customer,
                &request.plan,
                &request.last_four,
                &request.card_brand,
            )
            .await?;
        info!(subscription = %subscription.id, "subscription created");

        let widget_id: i64 = request
            .product_id
            .trim()
            .parse()
            .map_err(|_| CheckoutError::InvalidProductId(request.product_id.clone()))?;

        let customer_id = self
            .orders
            .insert_customer(&Customer {
                id: 0,
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                email: request.email.clone(),
            })
            .await
            .map_err(|err| CheckoutError::Persistence("customer", err))?;

        let amount: i64 = request
            .amount
            .trim()
            .parse()
            .map_err(|_| CheckoutError::InvalidAmount(request.amount.clone()))?;

        let transaction_id = self
            .orders
            .insert_transaction(&Transaction {
                amount,
                currency: "usd".to_string(),
                last_four: request.last_four.clone(),
                expiry_month: request.exp_month,
                expiry_year: request.exp_year,
                payment_intent: subscription.id.clone(),
                payment_method: request.payment_method.clone(),
                transaction_status_id: TRANSACTION_STATUS_CLEARED,
                ..Transaction::default()
            })
            .await
            .map_err(|err| CheckoutError::Persistence("transaction", err))?;

        let order_id = self
            .orders
            .insert_order(&Order {
                widget_id,
                transaction_id,
                customer_id,
                status_id: ORDER_STATUS_CLEARED,
                quantity: 1,
                amount,
                ..Order::default()
            })
            .await
            .map_err(|err| CheckoutError::Persistence("order", err))?;

        let product = match self.orders.get_widget(widget_id).await {
            Ok(Some(widget)) => widget.name,
            Ok(None) => format!("Plan {}", request.plan),
            Err(err) => return Err(CheckoutError::Persistence("order", err)),
        };

        self.invoices
            .send_invoice(&InvoiceOrder {
                id: order_id,
                quantity: 1,
                amount,
                product,
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                email: request.email.clone(),
                created_at: Utc::now(),
            })
            .await?;

        Ok(order_id)
    }

    /// Record a charge the virtual terminal already completed, copying card
    /// details from the processor.
    ///
    /// # Errors
    /// Processor lookups and the insert are propagated.
    #[instrument(skip_all, fields(payment_intent = %payment.payment_intent))]
    pub async fn record_terminal_payment(
        &self,
        payment: &TerminalPayment,
    ) -> Result<Transaction, CheckoutError> {
        let intent = self
            .processor
            .retrieve_payment_intent(&payment.payment_intent)
            .await?;
        let method = self
            .processor
            .get_payment_method(&payment.payment_method)
            .await?;
        let card = method.card.unwrap_or_default();

        let mut transaction = Transaction {
            id: 0,
            amount: payment.amount,
            currency: payment.currency.clone(),
            last_four: card.last4,
            expiry_month: card.exp_month,
            expiry_year: card.exp_year,
            payment_intent: payment.payment_intent.clone(),
            payment_method: payment.payment_method.clone(),
            bank_return_code: intent.latest_charge.unwrap_or_default(),
            transaction_status_id: TRANSACTION_STATUS_CLEARED,
        };
        transaction.id = self
            .orders
            .insert_transaction(&transaction)
            .await
            .map_err(|err| CheckoutError::Persistence("transaction", err))?;

        Ok(transaction)
    }

    /// Refund an order in full after checking the request against the stored
    /// transaction.
    ///
    /// # Errors
    /// Mismatches, processor failures and status update failures.
    #[instrument(skip_all, fields(order_id = request.id))]
    pub async fn refund(&self, request: &RefundRequest) -> Result<(), CheckoutError> {
        let recorded = self
            .orders
            .get_transaction_by_payment_intent(&request.payment_intent)
            .await
            .map_err(|err| CheckoutError::Persistence("transaction", err))?
            .ok_or_else(|| CheckoutError::UnknownPaymentIntent(request.payment_intent.clone()))?;

        if recorded.amount != request.amount {
            return Err(CheckoutError::AmountMismatch {
                requested: request.amount,
                recorded: recorded.amount,
            });
        }
        if recorded.currency != request.currency {
            return Err(CheckoutError::CurrencyMismatch {
                requested: request.currency.clone(),
                recorded: recorded.currency,
            });
        }

        self.processor
            .refund(&request.payment_intent, request.amount)
            .await?;

        self.orders
            .update_order_status(request.id, ORDER_STATUS_REFUNDED)
            .await
            .map_err(|err| {
                error!("refund recorded at processor only: {err}");
                CheckoutError::StatusNotRecorded("charge was refunded", err)
            })
    }

    /// Cancel the subscription behind an order.
    ///
    /// # Errors
    /// Processor failures and status update failures.
    #[instrument(skip_all, fields(order_id = request.id))]
    pub async fn cancel_subscription(&self, request: &CancelRequest) -> Result<(), CheckoutError> {
        self.processor
            .cancel_subscription(&request.payment_intent)
            .await?;

        self.orders
            .update_order_status(request.id, ORDER_STATUS_CANCELLED)
            .await
            .map_err(|err| {
                error!("cancellation recorded at processor only: {err}");
                CheckoutError::StatusNotRecorded("subscription was cancelled", err)
            })
    }
}
