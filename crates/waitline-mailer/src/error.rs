//! Error type for `waitline-mailer` construction paths.
//!
//! Send-time failures use [`waitline_core::mailer::SendFailure`], which is
//! already classified; this type only covers building a relay from
//! configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid mailbox address: {0}")]
  InvalidAddress(String),

  #[error("transport setup failed: {0}")]
  Transport(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
