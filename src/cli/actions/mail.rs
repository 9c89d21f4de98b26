use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::warn;

use crate::mailer::{LogMailer, Mailer, SmtpMailer};

#[derive(Debug, Default)]
pub struct SmtpArgs {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub tls: bool,
}

impl SmtpArgs {
    /// Build the configured mailer, falling back to logging mail when no
    /// relay host is set.
    ///
    /// # Errors
    /// Returns an error if the SMTP transport cannot be built.
    pub fn mailer(self) -> Result<Arc<dyn Mailer>> {
        let Some(host) = self.host else {
            warn!("No SMTP host configured, outgoing mail will only be logged");
            return Ok(Arc::new(LogMailer));
        };

        let mailer = SmtpMailer::new(&host, self.port, self.username, self.password, self.tls)
            .with_context(|| format!("Failed to configure SMTP relay {host}:{}", self.port))?;

        Ok(Arc::new(mailer))
    }

    pub(crate) fn describe(&self) -> String {
        self.host.as_ref().map_or_else(
            || "log only".to_string(),
            |host| {
                let tls = if self.tls { " (tls)" } else { "" };
                format!("{host}:{}{tls}", self.port)
            },
        )
    }
}
