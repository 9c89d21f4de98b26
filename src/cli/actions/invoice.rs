use anyhow::Result;
use std::path::PathBuf;

use super::{log_entries, mail::SmtpArgs};
use crate::{
    cli::telemetry,
    invoice::{self, InvoiceState},
};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub invoices_dir: PathBuf,
    pub mail_from: String,
    pub smtp: SmtpArgs,
}

/// Execute the invoice service action.
/// # Errors
/// Returns an error if the mailer cannot be built or the service fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_entries(
        "Invoice service configuration",
        &[
            ("listen", format!("tcp:{}", args.port)),
            ("invoices_dir", args.invoices_dir.display().to_string()),
            ("mail_from", args.mail_from.clone()),
            ("smtp", args.smtp.describe()),
        ],
    );

    let state = InvoiceState {
        invoices_dir: args.invoices_dir,
        mail_from: args.mail_from,
        mailer: args.smtp.mailer()?,
    };

    let result = invoice::serve(args.port, state).await;

    telemetry::shutdown_tracer();

    result
}
