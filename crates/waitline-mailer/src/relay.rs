//! Relay selection — the closed set of transport variants, chosen at
//! process start via configuration rather than runtime type inspection.

use lettre::message::Mailbox;
use serde::Deserialize;

use waitline_core::mailer::{Mailer, OutboundEmail, SendFailure, SendReceipt};

use crate::{
  oauth::{OAuthConfig, OAuthSmtpRelay},
  smtp::{SmtpConfig, SmtpRelay},
  Error, Result,
};

/// The From identity stamped on every outbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct SenderIdentity {
  pub name:    String,
  pub address: String,
}

impl SenderIdentity {
  pub fn mailbox(&self) -> Result<Mailbox> {
    format!("{} <{}>", self.name, self.address)
      .parse()
      .map_err(|e| Error::InvalidAddress(format!("{}: {e}", self.address)))
  }
}

/// Which transport variant to run, from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayConfig {
  Smtp(SmtpConfig),
  Oauth2(OAuthConfig),
}

/// The configured delivery transport.
pub enum Relay {
  Smtp(SmtpRelay),
  OAuth2(OAuthSmtpRelay),
}

impl Relay {
  pub fn from_config(config: &RelayConfig, sender: &SenderIdentity) -> Result<Self> {
    match config {
      RelayConfig::Smtp(cfg) => Ok(Relay::Smtp(SmtpRelay::new(cfg, sender)?)),
      RelayConfig::Oauth2(cfg) => Ok(Relay::OAuth2(OAuthSmtpRelay::new(cfg, sender)?)),
    }
  }
}

impl Mailer for Relay {
  fn name(&self) -> &str {
    match self {
      Relay::Smtp(m) => m.name(),
      Relay::OAuth2(m) => m.name(),
    }
  }

  async fn send(&self, email: &OutboundEmail) -> std::result::Result<SendReceipt, SendFailure> {
    match self {
      Relay::Smtp(m) => m.send(email).await,
      Relay::OAuth2(m) => m.send(email).await,
    }
  }

  async fn test_connection(&self) -> bool {
    match self {
      Relay::Smtp(m) => m.test_connection().await,
      Relay::OAuth2(m) => m.test_connection().await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sender_identity_builds_display_name_mailbox() {
    let sender = SenderIdentity {
      name:    "Waitline".into(),
      address: "hello@waitline.example".into(),
    };
    let mailbox = sender.mailbox().unwrap();
    assert_eq!(mailbox.email.to_string(), "hello@waitline.example");
  }

  #[test]
  fn sender_identity_rejects_garbage_address() {
    let sender = SenderIdentity {
      name:    "Waitline".into(),
      address: "not an address".into(),
    };
    assert!(matches!(sender.mailbox(), Err(Error::InvalidAddress(_))));
  }

  #[test]
  fn relay_config_deserialises_smtp_variant() {
    let config: RelayConfig = serde_json::from_value(serde_json::json!({
      "kind": "smtp",
      "host": "smtp.example.com",
      "username": "mailer",
      "password": "hunter2",
    }))
    .unwrap();

    match config {
      RelayConfig::Smtp(cfg) => {
        assert_eq!(cfg.host, "smtp.example.com");
        assert_eq!(cfg.port, 587);
      }
      other => panic!("expected smtp variant: {other:?}"),
    }
  }

  #[test]
  fn relay_config_deserialises_oauth_variant_with_defaults() {
    let config: RelayConfig = serde_json::from_value(serde_json::json!({
      "kind": "oauth2",
      "client_id": "id",
      "client_secret": "secret",
      "refresh_token": "refresh",
    }))
    .unwrap();

    match config {
      RelayConfig::Oauth2(cfg) => {
        assert_eq!(cfg.host, "smtp.gmail.com");
        assert_eq!(cfg.token_url, "https://oauth2.googleapis.com/token");
        assert_eq!(cfg.port, 587);
      }
      other => panic!("expected oauth2 variant: {other:?}"),
    }
  }

  #[tokio::test]
  async fn relay_construction_from_smtp_config() {
    let sender = SenderIdentity {
      name:    "Waitline".into(),
      address: "hello@waitline.example".into(),
    };
    let config = RelayConfig::Smtp(SmtpConfig {
      host:     "smtp.example.com".into(),
      port:     587,
      username: "mailer".into(),
      password: "hunter2".into(),
    });

    let relay = Relay::from_config(&config, &sender).unwrap();
    assert_eq!(relay.name(), "smtp");
  }
}
