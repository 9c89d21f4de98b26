//! # Widgets (storefront API, back office and invoice service)
//!
//! `widgets` sells a single product line, the widget, either as a one-off
//! purchase or as a recurring plan, through a hosted payment processor.
//!
//! ## Authentication
//!
//! Back-office routes are protected by opaque bearer tokens. A token is 16
//! random bytes encoded as 26 base32 characters; only its SHA-256 digest is
//! persisted. Logging in again revokes every earlier token of that user.
//!
//! ## Password reset
//!
//! Reset links carry the user's email encrypted with AES-CFB and are signed
//! with HMAC-SHA-256 over the whole URL plus an embedded Unix timestamp. The
//! signature and the age of the link are checked as two separate gates.
//!
//! ## Services
//!
//! - `widgets server` runs the JSON API (`/api/...`) and the `/ws`
//!   notification channel used by the back office.
//! - `widgets invoice` runs the invoice micro-service that renders and mails
//!   an invoice for every new order.

pub mod api;
pub mod auth;
pub mod cli;
pub mod encryption;
pub mod invoice;
pub mod mailer;
pub mod notify;
pub mod payments;
pub mod signer;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
