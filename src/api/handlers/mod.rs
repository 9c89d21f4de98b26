pub mod auth;
pub mod health;
pub mod password;
pub mod payments;
pub mod sales;
pub mod users;
pub mod widgets;
pub mod ws;

// common functions for the handlers
use regex::Regex;
use std::sync::OnceLock;

use super::error::ApiError;

pub fn valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(email))
}

/// Parse a numeric path segment.
///
/// # Errors
/// `BadRequest` naming `what` when `raw` is not an integer.
pub fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|err| ApiError::BadRequest(format!("error converting {what} id to int: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(valid_email("admin@example.com"));
        assert!(!valid_email("admin@example"));
        assert!(!valid_email("admin example.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn parse_id_reports_kind() {
        assert!(matches!(parse_id("12", "order"), Ok(12)));
        match parse_id("twelve", "order") {
            Err(ApiError::BadRequest(message)) => {
                assert!(message.starts_with("error converting order id to int"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
