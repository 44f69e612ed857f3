//! Static-credential STARTTLS relay.

use lettre::{
  AsyncSmtpTransport, Tokio1Executor,
  message::Mailbox,
  transport::smtp::authentication::Credentials,
};
use serde::Deserialize;

use waitline_core::mailer::{Mailer, OutboundEmail, SendFailure, SendReceipt};

use crate::{
  message::deliver,
  relay::SenderIdentity,
  Error, Result,
};

fn default_port() -> u16 {
  587
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
  pub host:     String,
  #[serde(default = "default_port")]
  pub port:     u16,
  pub username: String,
  pub password: String,
}

/// Relay authenticated with a fixed username/password (e.g. an app
/// password). The transport pools connections internally.
pub struct SmtpRelay {
  transport: AsyncSmtpTransport<Tokio1Executor>,
  from:      Mailbox,
}

impl SmtpRelay {
  pub fn new(config: &SmtpConfig, sender: &SenderIdentity) -> Result<Self> {
    let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
      .map_err(|e| Error::Transport(e.to_string()))?
      .port(config.port)
      .credentials(Credentials::new(
        config.username.clone(),
        config.password.clone(),
      ))
      .build();

    Ok(Self { transport, from: sender.mailbox()? })
  }
}

impl Mailer for SmtpRelay {
  fn name(&self) -> &str {
    "smtp"
  }

  async fn send(&self, email: &OutboundEmail) -> std::result::Result<SendReceipt, SendFailure> {
    deliver(&self.transport, &self.from, email).await
  }

  async fn test_connection(&self) -> bool {
    self.transport.test_connection().await.unwrap_or(false)
  }
}
