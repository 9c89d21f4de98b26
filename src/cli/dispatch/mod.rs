use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;
use std::path::PathBuf;

use crate::{
    cli::{
        actions::{invoice, mail::SmtpArgs, server, Action},
        commands::{
            invoice as invoice_args, server as server_args,
            smtp::{ARG_SMTP_HOST, ARG_SMTP_PASSWORD, ARG_SMTP_PORT, ARG_SMTP_TLS, ARG_SMTP_USER},
        },
    },
    encryption::is_valid_key_length,
};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some(("server", sub)) => server_action(sub),
        Some(("invoice", sub)) => invoice_action(sub),
        _ => bail!("missing subcommand: expected `server` or `invoice`"),
    }
}

fn required(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

fn smtp_args(matches: &ArgMatches) -> SmtpArgs {
    SmtpArgs {
        host: matches.get_one::<String>(ARG_SMTP_HOST).cloned(),
        port: matches.get_one::<u16>(ARG_SMTP_PORT).copied().unwrap_or(1025),
        username: matches.get_one::<String>(ARG_SMTP_USER).cloned(),
        password: matches
            .get_one::<String>(ARG_SMTP_PASSWORD)
            .cloned()
            .map(SecretString::from),
        tls: matches.get_flag(ARG_SMTP_TLS),
    }
}

fn server_action(matches: &ArgMatches) -> Result<Action> {
    let secret_key = required(matches, server_args::ARG_SECRET_KEY)?;
    if !is_valid_key_length(secret_key.len()) {
        bail!(
            "--{} must be 16, 24 or 32 bytes long, got {}",
            server_args::ARG_SECRET_KEY,
            secret_key.len()
        );
    }

    Ok(Action::Server(server::Args {
        port: matches
            .get_one::<u16>(server_args::ARG_PORT)
            .copied()
            .unwrap_or(4001),
        dsn: SecretString::from(required(matches, server_args::ARG_DSN)?),
        secret_key: SecretString::from(secret_key),
        frontend_url: required(matches, server_args::ARG_FRONTEND_URL)?,
        stripe_secret: SecretString::from(required(matches, server_args::ARG_STRIPE_SECRET)?),
        invoice_url: required(matches, server_args::ARG_INVOICE_URL)?,
        token_ttl_hours: matches
            .get_one::<i64>(server_args::ARG_TOKEN_TTL_HOURS)
            .copied()
            .unwrap_or(12),
        reset_link_max_age_minutes: matches
            .get_one::<i64>(server_args::ARG_RESET_LINK_MAX_AGE)
            .copied()
            .unwrap_or(crate::api::DEFAULT_RESET_LINK_MAX_AGE_MINUTES),
        mail_from: required(matches, server_args::ARG_MAIL_FROM)?,
        smtp: smtp_args(matches),
    }))
}

fn invoice_action(matches: &ArgMatches) -> Result<Action> {
    Ok(Action::Invoice(invoice::Args {
        port: matches
            .get_one::<u16>(invoice_args::ARG_PORT)
            .copied()
            .unwrap_or(5000),
        invoices_dir: PathBuf::from(required(matches, invoice_args::ARG_INVOICES_DIR)?),
        mail_from: required(matches, invoice_args::ARG_MAIL_FROM)?,
        smtp: smtp_args(matches),
    }))
}
