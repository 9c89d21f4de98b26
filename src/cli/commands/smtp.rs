use clap::{Arg, ArgAction, Command};

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USER: &str = "smtp-user";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_SMTP_TLS: &str = "smtp-tls";

/// SMTP relay options; without `--smtp-host` mail is only logged.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host, mail is written to the log when unset")
                .env("SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port")
                .default_value("1025")
                .env("SMTP_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USER)
                .long(ARG_SMTP_USER)
                .help("SMTP username")
                .env("SMTP_USER")
                .requires(ARG_SMTP_PASSWORD),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("SMTP_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_SMTP_USER),
        )
        .arg(
            Arg::new(ARG_SMTP_TLS)
                .long(ARG_SMTP_TLS)
                .help("Use TLS (implicit on port 465, STARTTLS otherwise)")
                .env("SMTP_TLS")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("test"))
    }

    #[test]
    fn defaults_to_local_catcher_port() {
        temp_env::with_vars(
            [
                ("SMTP_HOST", None::<&str>),
                ("SMTP_PORT", None),
                ("SMTP_TLS", None),
            ],
            || {
                let matches = command().get_matches_from(vec!["test"]);
                assert_eq!(matches.get_one::<u16>(ARG_SMTP_PORT).copied(), Some(1025));
                assert!(matches.get_one::<String>(ARG_SMTP_HOST).is_none());
                assert!(!matches.get_flag(ARG_SMTP_TLS));
            },
        );
    }

    #[test]
    fn reads_env() {
        temp_env::with_vars(
            [
                ("SMTP_HOST", Some("smtp.example.com")),
                ("SMTP_PORT", Some("465")),
                ("SMTP_TLS", Some("true")),
            ],
            || {
                let matches = command().get_matches_from(vec!["test"]);
                assert_eq!(
                    matches.get_one::<String>(ARG_SMTP_HOST).map(String::as_str),
                    Some("smtp.example.com")
                );
                assert_eq!(matches.get_one::<u16>(ARG_SMTP_PORT).copied(), Some(465));
                assert!(matches.get_flag(ARG_SMTP_TLS));
            },
        );
    }

    #[test]
    fn user_requires_password() {
        temp_env::with_vars(
            [("SMTP_USER", None::<&str>), ("SMTP_PASSWORD", None)],
            || {
                let result =
                    command().try_get_matches_from(vec!["test", "--smtp-user", "mailer"]);
                assert_eq!(
                    result.map_err(|e| e.kind()).map(|_| ()),
                    Err(clap::error::ErrorKind::MissingRequiredArgument)
                );
            },
        );
    }
}
