//! Canonical-identity derivation for email addresses.
//!
//! Large mailbox providers treat many distinct spellings as one inbox
//! (gmail ignores dots and `+tag` aliases, yahoo uses `-` aliases). The
//! normalized form produced here is the sole deduplication key: two raw
//! addresses that normalize identically are the same subscriber.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Provider family an address belongs to, as far as alias rules go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxProvider {
  Gmail,
  Outlook,
  Yahoo,
  Other,
}

impl MailboxProvider {
  pub fn as_str(self) -> &'static str {
    match self {
      MailboxProvider::Gmail => "gmail",
      MailboxProvider::Outlook => "outlook",
      MailboxProvider::Yahoo => "yahoo",
      MailboxProvider::Other => "other",
    }
  }
}

/// The result of normalising one raw address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEmail {
  /// As typed by the user, trimmed.
  pub original:   String,
  /// Canonical form; globally unique per subscriber.
  pub normalized: String,
  pub provider:   MailboxProvider,
}

/// Cheap shape check: non-empty local part, exactly one `@`, a domain with
/// an interior dot, no whitespace anywhere.
pub fn is_valid_format(email: &str) -> bool {
  if email.chars().any(char::is_whitespace) {
    return false;
  }
  let Some((local, domain)) = email.split_once('@') else {
    return false;
  };
  if local.is_empty() || domain.contains('@') {
    return false;
  }
  match domain.rsplit_once('.') {
    Some((head, tail)) => !head.is_empty() && !tail.is_empty(),
    None => false,
  }
}

/// Derive the canonical identity for `raw`.
///
/// Fails with [`Error::InvalidFormat`] unless the trimmed input has
/// `local@domain` shape.
pub fn normalize(raw: &str) -> Result<CanonicalEmail> {
  let original = raw.trim();
  let lowered = original.to_lowercase();

  if !is_valid_format(&lowered) {
    return Err(Error::InvalidFormat(original.to_string()));
  }
  let Some((local, domain)) = lowered.split_once('@') else {
    return Err(Error::InvalidFormat(original.to_string()));
  };

  let (local, provider) = if domain == "gmail.com" || domain == "googlemail.com" {
    // Dots are ignored and everything from the first `+` is an alias.
    let stripped = local.split('+').next().unwrap_or(local);
    (stripped.replace('.', ""), MailboxProvider::Gmail)
  } else if matches!(domain, "outlook.com" | "hotmail.com" | "live.com") {
    // `+alias` only; dots are significant.
    let stripped = local.split('+').next().unwrap_or(local);
    (stripped.to_string(), MailboxProvider::Outlook)
  } else if domain.starts_with("yahoo.") {
    // Yahoo uses `-` where others use `+`.
    let stripped = local.split('-').next().unwrap_or(local);
    (stripped.to_string(), MailboxProvider::Yahoo)
  } else {
    (local.to_string(), MailboxProvider::Other)
  };

  Ok(CanonicalEmail {
    original:   original.to_string(),
    normalized: format!("{local}@{domain}"),
    provider,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gmail_strips_dots_and_alias() {
    let id = normalize("A.B+tag@Gmail.com").unwrap();
    assert_eq!(id.normalized, "ab@gmail.com");
    assert_eq!(id.provider, MailboxProvider::Gmail);
    assert_eq!(id.original, "A.B+tag@Gmail.com");
  }

  #[test]
  fn googlemail_is_gmail() {
    let id = normalize("a.b@googlemail.com").unwrap();
    assert_eq!(id.normalized, "ab@googlemail.com");
    assert_eq!(id.provider, MailboxProvider::Gmail);
  }

  #[test]
  fn outlook_strips_alias_keeps_dots() {
    let id = normalize("a.b+y@outlook.com").unwrap();
    assert_eq!(id.normalized, "a.b@outlook.com");
    assert_eq!(id.provider, MailboxProvider::Outlook);
  }

  #[test]
  fn yahoo_strips_dash_alias() {
    let id = normalize("a-b@yahoo.com").unwrap();
    assert_eq!(id.normalized, "a@yahoo.com");
    assert_eq!(id.provider, MailboxProvider::Yahoo);
  }

  #[test]
  fn yahoo_country_domains_match_prefix() {
    let id = normalize("a-b@yahoo.co.uk").unwrap();
    assert_eq!(id.normalized, "a@yahoo.co.uk");
    assert_eq!(id.provider, MailboxProvider::Yahoo);
  }

  #[test]
  fn other_domains_lowercase_only() {
    let id = normalize("  First.Last+x@Example.COM ").unwrap();
    assert_eq!(id.normalized, "first.last+x@example.com");
    assert_eq!(id.provider, MailboxProvider::Other);
    assert_eq!(id.original, "First.Last+x@Example.COM");
  }

  #[test]
  fn invalid_shapes_rejected() {
    for raw in [
      "not-an-email",
      "no at sign",
      "@example.com",
      "a@nodot",
      "a@b.",
      "a@.com",
      "a b@example.com",
      "a@exam ple.com",
      "",
    ] {
      assert!(
        matches!(normalize(raw), Err(Error::InvalidFormat(_))),
        "expected rejection: {raw:?}"
      );
    }
  }
}
