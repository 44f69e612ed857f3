//! External human-verification token check.
//!
//! Speaks the common `siteverify` shape: POST the shared secret and the
//! client token as a form, read `{"success": bool}` back. With no service
//! configured every token proof is rejected, leaving the bundled arithmetic
//! challenge as the only way through.

use serde::Deserialize;

use waitline_core::{Error, guard::HumanVerifier};

#[derive(Debug, Clone, Deserialize)]
pub struct VerifierConfig {
  /// The service's siteverify endpoint.
  pub url:    String,
  /// Server-side secret key.
  pub secret: String,
}

pub struct TokenVerifier {
  config: Option<VerifierConfig>,
  http:   reqwest::Client,
}

impl TokenVerifier {
  pub fn new(config: Option<VerifierConfig>) -> Self {
    Self { config, http: reqwest::Client::new() }
  }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
  success: bool,
}

impl HumanVerifier for TokenVerifier {
  async fn verify(&self, token: &str) -> waitline_core::Result<bool> {
    let Some(config) = &self.config else {
      return Ok(false);
    };

    let response = self
      .http
      .post(&config.url)
      .form(&[("secret", config.secret.as_str()), ("response", token)])
      .send()
      .await
      .map_err(|e| Error::VerifierUnavailable(e.to_string()))?
      .error_for_status()
      .map_err(|e| Error::VerifierUnavailable(e.to_string()))?;

    let body: VerifyResponse = response
      .json()
      .await
      .map_err(|e| Error::VerifierUnavailable(e.to_string()))?;

    Ok(body.success)
  }
}
