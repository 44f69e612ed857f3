//! SMTP delivery backends for Waitline.
//!
//! Implements the [`Mailer`](waitline_core::mailer::Mailer) trait over
//! [`lettre`] in two variants: a static-credential STARTTLS relay and an
//! OAuth2 (XOAUTH2) relay that refreshes short-lived access tokens and
//! caches the authenticated transport. The [`Relay`] enum is the closed set
//! of variants selected from configuration at process start.

mod message;
mod oauth;
mod relay;
mod smtp;

pub mod error;

pub use error::{Error, Result};
pub use oauth::{OAuthConfig, OAuthSmtpRelay};
pub use relay::{Relay, RelayConfig, SenderIdentity};
pub use smtp::{SmtpConfig, SmtpRelay};
