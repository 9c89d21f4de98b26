use clap::{Arg, Command};

pub const ARG_PORT: &str = "port";
pub const ARG_INVOICES_DIR: &str = "invoices-dir";
pub const ARG_MAIL_FROM: &str = "mail-from";

#[must_use]
pub fn command() -> Command {
    let command = Command::new("invoice")
        .about("Run the invoice service")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("5000")
                .env("INVOICE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_INVOICES_DIR)
                .long(ARG_INVOICES_DIR)
                .help("Directory where rendered invoices are written")
                .default_value("./invoices")
                .env("INVOICE_DIR"),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address of invoice mail")
                .default_value(crate::api::DEFAULT_MAIL_FROM)
                .env("WIDGETS_MAIL_FROM"),
        );

    super::smtp::with_args(command)
}
