use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use url::Url;

use super::{log_entries, mail::SmtpArgs};
use crate::{
    api::{self, ApiConfig, AppState, Services},
    cli::telemetry,
    invoice::HttpInvoiceSender,
    payments::stripe::StripeClient,
    storage::postgres::PgStore,
};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub secret_key: SecretString,
    pub frontend_url: String,
    pub stripe_secret: SecretString,
    pub invoice_url: String,
    pub token_ttl_hours: i64,
    pub reset_link_max_age_minutes: i64,
    pub mail_from: String,
    pub smtp: SmtpArgs,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let token_ttl = Duration::try_hours(args.token_ttl_hours)
        .ok_or_else(|| anyhow!("token TTL of {} hours is out of range", args.token_ttl_hours))?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(std::time::Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(args.dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let services = Services {
        mailer: args.smtp.mailer()?,
        payments: Arc::new(
            StripeClient::new(args.stripe_secret).context("Failed to build payment client")?,
        ),
        invoices: Arc::new(
            HttpInvoiceSender::new(&args.invoice_url).context("Invalid invoice service URL")?,
        ),
    };

    let config = ApiConfig::new()
        .with_frontend_url(args.frontend_url)
        .with_mail_from(args.mail_from)
        .with_reset_link_max_age_minutes(args.reset_link_max_age_minutes)
        .with_token_ttl(token_ttl);

    let state = AppState::new(
        Arc::new(PgStore::new(pool)),
        args.secret_key.expose_secret().as_bytes(),
        services,
        config,
    )?;

    let result = api::serve(args.port, Arc::new(state)).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(args.dsn.expose_secret())),
        ("frontend_url", args.frontend_url.clone()),
        ("invoice_url", args.invoice_url.clone()),
        ("token_ttl_hours", args.token_ttl_hours.to_string()),
        (
            "reset_link_max_age_minutes",
            args.reset_link_max_age_minutes.to_string(),
        ),
        ("mail_from", args.mail_from.clone()),
        ("smtp", args.smtp.describe()),
    ];
    log_entries("Server configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}
