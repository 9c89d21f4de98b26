use clap::{Arg, Command};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_SECRET_KEY: &str = "secret-key";
pub const ARG_FRONTEND_URL: &str = "frontend-url";
pub const ARG_STRIPE_SECRET: &str = "stripe-secret";
pub const ARG_INVOICE_URL: &str = "invoice-url";
pub const ARG_TOKEN_TTL_HOURS: &str = "token-ttl-hours";
pub const ARG_RESET_LINK_MAX_AGE: &str = "reset-link-max-age-minutes";
pub const ARG_MAIL_FROM: &str = "mail-from";

/// One year.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;
/// One week.
pub const MAX_RESET_LINK_MAX_AGE_MINUTES: i64 = 60 * 24 * 7;

#[must_use]
pub fn command() -> Command {
    let command = Command::new("server")
        .about("Run the storefront and back-office API")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("4001")
                .env("WIDGETS_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("WIDGETS_DSN")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SECRET_KEY)
                .long(ARG_SECRET_KEY)
                .help("Key for signing reset links and encrypting emails (16, 24 or 32 bytes)")
                .env("WIDGETS_SECRET_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_FRONTEND_URL)
                .long(ARG_FRONTEND_URL)
                .help("Storefront base URL, used for CORS and reset links")
                .default_value(crate::api::DEFAULT_FRONTEND_URL)
                .env("WIDGETS_FRONTEND_URL"),
        )
        .arg(
            Arg::new(ARG_STRIPE_SECRET)
                .long(ARG_STRIPE_SECRET)
                .help("Payment processor secret key")
                .env("STRIPE_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_INVOICE_URL)
                .long(ARG_INVOICE_URL)
                .help("Base URL of the invoice service")
                .default_value("http://localhost:5000")
                .env("WIDGETS_INVOICE_URL"),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_HOURS)
                .long(ARG_TOKEN_TTL_HOURS)
                .help("Lifetime of back-office bearer tokens in hours")
                .default_value("12")
                .env("WIDGETS_TOKEN_TTL_HOURS")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_TOKEN_TTL_HOURS)),
        )
        .arg(
            Arg::new(ARG_RESET_LINK_MAX_AGE)
                .long(ARG_RESET_LINK_MAX_AGE)
                .help("Minutes a password reset link stays valid")
                .default_value("60")
                .env("WIDGETS_RESET_LINK_MAX_AGE_MINUTES")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_RESET_LINK_MAX_AGE_MINUTES)),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address of outgoing mail")
                .default_value(crate::api::DEFAULT_MAIL_FROM)
                .env("WIDGETS_MAIL_FROM"),
        );

    super::smtp::with_args(command)
}
