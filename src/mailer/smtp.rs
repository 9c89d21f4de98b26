use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment as LettreAttachment, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::{ExposeSecret, SecretString};

use super::{MailError, Mailer, OutgoingEmail};

/// Delivers mail through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer").finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Plain connections are used unless `use_tls` is set (local catchers like
    /// MailHog listen on 1025 without TLS).
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the relay or TLS parameters cannot be built.
    pub fn new(
        host: &str,
        port: u16,
        username: Option<String>,
        password: Option<SecretString>,
        use_tls: bool,
    ) -> Result<Self, MailError> {
        let mut builder = if use_tls {
            let tls_params = TlsParameters::new(host.to_string())
                .map_err(|e| MailError::InvalidConfig(format!("TLS configuration error: {e}")))?;

            // Port 465 uses implicit TLS, other ports use STARTTLS
            if port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                    .map_err(|e| MailError::InvalidConfig(format!("SMTP relay error: {e}")))?
                    .port(port)
                    .tls(Tls::Wrapper(tls_params))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| MailError::InvalidConfig(format!("SMTP relay error: {e}")))?
                    .port(port)
                    .tls(Tls::Required(tls_params))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user, pass.expose_secret().to_string()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn build_message(email: OutgoingEmail) -> Result<Message, MailError> {
    let alternative = MultiPart::alternative()
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(email.text),
        )
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(email.html),
        );

    let mut body = MultiPart::mixed().multipart(alternative);
    for attachment in email.attachments {
        let content_type = ContentType::parse(&attachment.content_type)
            .map_err(|e| MailError::Template(format!("invalid attachment type: {e}")))?;
        body = body.singlepart(
            LettreAttachment::new(attachment.filename).body(attachment.body, content_type),
        );
    }

    Message::builder()
        .from(
            email
                .from
                .parse()
                .map_err(|e| MailError::Address(format!("from: {e}")))?,
        )
        .to(email
            .to
            .parse()
            .map_err(|e| MailError::Address(format!("to: {e}")))?)
        .subject(email.subject)
        .multipart(body)
        .map_err(|e| MailError::SendFailed(format!("Failed to build email: {e}")))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let message = build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;
        Ok(())
    }
}
