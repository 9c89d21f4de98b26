use anyhow::{anyhow, bail, Result};
use chrono::Duration;
use std::sync::Arc;

use crate::{
    auth::Authenticator,
    encryption::{is_valid_key_length, Encryptor},
    invoice::InvoiceSender,
    mailer::Mailer,
    notify::Hub,
    payments::{Checkout, PaymentProcessor},
    signer::UrlSigner,
    storage::Store,
};

pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:4000";
pub const DEFAULT_MAIL_FROM: &str = "info@widgets.dev";
pub const DEFAULT_RESET_LINK_MAX_AGE_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    frontend_url: String,
    mail_from: String,
    reset_link_max_age_minutes: i64,
    token_ttl: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            mail_from: DEFAULT_MAIL_FROM.to_string(),
            reset_link_max_age_minutes: DEFAULT_RESET_LINK_MAX_AGE_MINUTES,
            token_ttl: Duration::hours(crate::auth::authenticator::DEFAULT_TOKEN_TTL_HOURS),
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_frontend_url(mut self, frontend_url: impl Into<String>) -> Self {
        self.frontend_url = frontend_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_mail_from(mut self, mail_from: impl Into<String>) -> Self {
        self.mail_from = mail_from.into();
        self
    }

    #[must_use]
    pub const fn with_reset_link_max_age_minutes(mut self, minutes: i64) -> Self {
        self.reset_link_max_age_minutes = minutes;
        self
    }

    #[must_use]
    pub const fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn frontend_url(&self) -> &str {
        &self.frontend_url
    }

    #[must_use]
    pub fn mail_from(&self) -> &str {
        &self.mail_from
    }

    #[must_use]
    pub const fn reset_link_max_age_minutes(&self) -> i64 {
        self.reset_link_max_age_minutes
    }

    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        self.token_ttl
    }
}

/// Collaborators the server is wired with.
pub struct Services {
    pub mailer: Arc<dyn Mailer>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub invoices: Arc<dyn InvoiceSender>,
}

/// Everything the handlers share, handed out as an `Extension`.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub authenticator: Authenticator,
    pub signer: UrlSigner,
    pub encryptor: Encryptor,
    pub mailer: Arc<dyn Mailer>,
    pub checkout: Checkout,
    pub hub: Arc<Hub>,
    pub config: ApiConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("authenticator", &self.authenticator)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// `secret` keys both the link signer and the email encryptor.
    ///
    /// Starts the notification hub, so it must run inside a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if `secret` is not 16, 24 or 32 bytes long.
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        secret: &[u8],
        services: Services,
        config: ApiConfig,
    ) -> Result<Self> {
        if !is_valid_key_length(secret.len()) {
            bail!(
                "secret key must be 16, 24 or 32 bytes long, got {}",
                secret.len()
            );
        }
        let signer = UrlSigner::new(secret)
            .map_err(|err| anyhow!("Failed to key the URL signer: {err}"))?;

        let authenticator = Authenticator::new(store.clone()).with_ttl(config.token_ttl());
        let checkout = Checkout::new(services.payments, store.clone(), services.invoices);

        Ok(Self {
            store,
            authenticator,
            signer,
            encryptor: Encryptor::new(secret),
            mailer: services.mailer,
            checkout,
            hub: Hub::spawn(),
            config,
        })
    }
}
