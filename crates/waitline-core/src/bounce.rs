//! Transport-agnostic hard-bounce classification.
//!
//! A hard bounce means the recipient address is permanently invalid; the
//! identity is then suppressed and never sent to again. Classification is
//! purely textual so every transport variant shares one policy.

/// Permanent-failure phrases, matched case-insensitively against whatever
/// error text the transport produced.
const HARD_BOUNCE_PATTERNS: &[&str] = &[
  "user unknown",
  "no such user",
  "invalid recipient",
  "recipient address rejected",
  "mailbox unavailable",
  "address not found",
  "does not exist",
  "550 5.1.1",
  "551 5.1.1",
  "553 5.3.0",
];

/// True when `message` indicates a permanently invalid recipient.
/// Anything unmatched is treated as transient/unknown.
pub fn is_hard_bounce(message: &str) -> bool {
  let lowered = message.to_lowercase();
  HARD_BOUNCE_PATTERNS.iter().any(|p| lowered.contains(p))
}
