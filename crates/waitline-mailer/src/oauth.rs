//! OAuth2 (XOAUTH2) STARTTLS relay.
//!
//! Exchanges a long-lived refresh token for short-lived access tokens at the
//! provider's token endpoint, and caches the authenticated transport until
//! shortly before the token expires. The cache sits behind a mutex so
//! concurrent sends never race to initialise it twice.

use std::time::{Duration, Instant};

use lettre::{
  AsyncSmtpTransport, Tokio1Executor,
  message::Mailbox,
  transport::smtp::authentication::{Credentials, Mechanism},
};
use serde::Deserialize;
use tokio::sync::Mutex;

use waitline_core::mailer::{Mailer, OutboundEmail, SendFailure, SendReceipt};

use crate::{
  message::deliver,
  relay::SenderIdentity,
  Error, Result,
};

fn default_token_url() -> String {
  "https://oauth2.googleapis.com/token".to_string()
}

fn default_host() -> String {
  "smtp.gmail.com".to_string()
}

fn default_port() -> u16 {
  587
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
  pub client_id:     String,
  pub client_secret: String,
  pub refresh_token: String,
  #[serde(default = "default_token_url")]
  pub token_url:     String,
  #[serde(default = "default_host")]
  pub host:          String,
  #[serde(default = "default_port")]
  pub port:          u16,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  expires_in:   u64,
}

struct CachedTransport {
  transport:  AsyncSmtpTransport<Tokio1Executor>,
  expires_at: Instant,
}

pub struct OAuthSmtpRelay {
  config: OAuthConfig,
  from:   Mailbox,
  http:   reqwest::Client,
  cached: Mutex<Option<CachedTransport>>,
}

impl OAuthSmtpRelay {
  pub fn new(config: &OAuthConfig, sender: &SenderIdentity) -> Result<Self> {
    Ok(Self {
      config: config.clone(),
      from:   sender.mailbox()?,
      http:   reqwest::Client::new(),
      cached: Mutex::new(None),
    })
  }

  /// Return the cached transport, refreshing the access token first when
  /// the cache is empty or stale.
  async fn transport(&self) -> std::result::Result<AsyncSmtpTransport<Tokio1Executor>, SendFailure> {
    let mut slot = self.cached.lock().await;

    if let Some(cached) = slot.as_ref()
      && Instant::now() < cached.expires_at
    {
      return Ok(cached.transport.clone());
    }

    let token = self.fetch_access_token().await?;
    tracing::debug!(host = %self.config.host, "refreshed OAuth2 access token");

    let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
      .map_err(|e| SendFailure {
        code:        "smtp_connection".into(),
        message:     e.to_string(),
        hard_bounce: false,
      })?
      .port(self.config.port)
      .authentication(vec![Mechanism::Xoauth2])
      .credentials(Credentials::new(
        self.from.email.to_string(),
        token.access_token,
      ))
      .build();

    // Rebuild a minute early so an in-flight send never uses a token that
    // expires mid-session.
    let expires_at =
      Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(60));
    *slot = Some(CachedTransport { transport: transport.clone(), expires_at });

    Ok(transport)
  }

  async fn fetch_access_token(&self) -> std::result::Result<TokenResponse, SendFailure> {
    let oauth_failure = |detail: String| SendFailure {
      code:        "oauth_refresh".into(),
      message:     detail,
      hard_bounce: false,
    };

    let response = self
      .http
      .post(&self.config.token_url)
      .form(&[
        ("client_id", self.config.client_id.as_str()),
        ("client_secret", self.config.client_secret.as_str()),
        ("refresh_token", self.config.refresh_token.as_str()),
        ("grant_type", "refresh_token"),
      ])
      .send()
      .await
      .map_err(|e| oauth_failure(format!("token endpoint unreachable: {e}")))?;

    let response = response
      .error_for_status()
      .map_err(|e| oauth_failure(format!("token endpoint rejected refresh: {e}")))?;

    response
      .json::<TokenResponse>()
      .await
      .map_err(|e| oauth_failure(format!("malformed token response: {e}")))
  }
}

impl Mailer for OAuthSmtpRelay {
  fn name(&self) -> &str {
    "oauth2"
  }

  async fn send(&self, email: &OutboundEmail) -> std::result::Result<SendReceipt, SendFailure> {
    let transport = self.transport().await?;
    deliver(&transport, &self.from, email).await
  }

  async fn test_connection(&self) -> bool {
    match self.transport().await {
      Ok(transport) => transport.test_connection().await.unwrap_or(false),
      Err(e) => {
        tracing::warn!(error = %e, "OAuth2 transport unavailable");
        false
      }
    }
  }
}
