//! Invoice micro-service and the client the API uses to reach it.
//!
//! `POST /invoice/create-and-send` renders an invoice document for an order,
//! stores it under the invoices directory and mails it to the customer.

pub mod handlers;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{routing::post, Extension, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::ToSchema;

use crate::{mailer::Mailer, APP_USER_AGENT};

pub const CREATE_AND_SEND_PATH: &str = "/invoice/create-and-send";

/// Order summary sent to the invoice service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceOrder {
    pub id: i64,
    pub quantity: i32,
    /// Amount in cents.
    pub amount: i64,
    pub product: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("invoice service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invoice service answered {0}")]
    Status(reqwest::StatusCode),
}

/// Anything able to get an invoice to a customer.
#[async_trait]
pub trait InvoiceSender: Send + Sync {
    async fn send_invoice(&self, order: &InvoiceOrder) -> Result<(), InvoiceError>;
}

/// Calls the invoice micro-service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpInvoiceSender {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpInvoiceSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, InvoiceError> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}{CREATE_AND_SEND_PATH}", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl InvoiceSender for HttpInvoiceSender {
    async fn send_invoice(&self, order: &InvoiceOrder) -> Result<(), InvoiceError> {
        let response = self.http.post(&self.endpoint).json(order).send().await?;
        if !response.status().is_success() {
            return Err(InvoiceError::Status(response.status()));
        }
        info!(order_id = order.id, "invoice requested");
        Ok(())
    }
}

/// Format cents as `12.34`.
#[must_use]
pub fn format_cents(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let amount = amount.unsigned_abs();
    format!("{sign}{}.{:02}", amount / 100, amount % 100)
}

/// Plain-text invoice document for `order`.
#[must_use]
pub fn render(order: &InvoiceOrder) -> String {
    let total = format_cents(order.amount);
    let unit = if order.quantity > 0 {
        format_cents(order.amount / i64::from(order.quantity))
    } else {
        total.clone()
    };
    format!(
        "WIDGETS INVOICE #{id}\n\
         Date: {date}\n\
         \n\
         Bill to: {first} {last} <{email}>\n\
         \n\
         {product:<40} {quantity:>5} x ${unit:>10}\n\
         \n\
         Total: ${total}\n",
        id = order.id,
        date = order.created_at.format("%Y-%m-%d"),
        first = order.first_name,
        last = order.last_name,
        email = order.email,
        product = order.product,
        quantity = order.quantity,
    )
}

/// Shared state of the invoice service.
#[derive(Clone)]
pub struct InvoiceState {
    pub invoices_dir: PathBuf,
    pub mail_from: String,
    pub mailer: Arc<dyn Mailer>,
}

impl std::fmt::Debug for InvoiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceState")
            .field("invoices_dir", &self.invoices_dir)
            .field("mail_from", &self.mail_from)
            .finish_non_exhaustive()
    }
}

#[must_use]
pub fn router(state: InvoiceState) -> Router {
    Router::new()
        .route(CREATE_AND_SEND_PATH, post(handlers::create_and_send))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(Arc::new(state))),
        )
}

/// Run the invoice service until the process is stopped.
///
/// # Errors
/// Returns an error if the invoices directory cannot be created or the listener fails.
pub async fn serve(port: u16, state: InvoiceState) -> Result<()> {
    tokio::fs::create_dir_all(&state.invoices_dir)
        .await
        .with_context(|| format!("Failed to create {}", state.invoices_dir.display()))?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;
    info!("Invoice service listening on [::]:{}", port);

    axum::serve(listener, router(state).into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> InvoiceOrder {
        InvoiceOrder {
            id: 12,
            quantity: 2,
            amount: 4000,
            product: "Widget".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        }
    }

    #[test]
    fn formats_cents() {
        assert_eq!(format_cents(2000), "20.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(-150), "-1.50");
    }

    #[test]
    fn render_lists_order() {
        let document = render(&order());
        assert!(document.starts_with("WIDGETS INVOICE #12"));
        assert!(document.contains("Date: 2023-11-14"));
        assert!(document.contains("Ada Lovelace <ada@example.com>"));
        assert!(document.contains("20.00"));
        assert!(document.contains("Total: $40.00"));
    }

    #[test]
    fn endpoint_joins_base_url() -> Result<(), InvoiceError> {
        let sender = HttpInvoiceSender::new("http://localhost:5000/")?;
        assert_eq!(sender.endpoint, "http://localhost:5000/invoice/create-and-send");
        Ok(())
    }
}
