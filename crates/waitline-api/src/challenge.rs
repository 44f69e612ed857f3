//! `GET /api/waitlist/challenge` — arithmetic human-verification challenge.
//!
//! The expected answer travels with the challenge; the client echoes it back
//! alongside the visitor's answer for the equality check. This only needs to
//! stop dumb form bots, not a determined adversary.

use axum::Json;
use rand::Rng as _;
use serde::Serialize;

use waitline_core::guard::{Challenge, ChallengeOp};

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
  #[serde(flatten)]
  pub challenge: Challenge,
  pub expected:  i64,
}

/// `GET /api/waitlist/challenge`
pub async fn handler() -> Json<ChallengeResponse> {
  let mut rng = rand::thread_rng();

  let op = match rng.gen_range(0..3) {
    0 => ChallengeOp::Add,
    1 => ChallengeOp::Sub,
    _ => ChallengeOp::Mul,
  };

  let a: i64 = rng.gen_range(1..=9);
  let b: i64 = rng.gen_range(1..=9);
  // Keep subtraction results non-negative; small positive numbers read
  // better in a form hint.
  let (lhs, rhs) = if op == ChallengeOp::Sub {
    (a.max(b), a.min(b))
  } else {
    (a, b)
  };

  let challenge = Challenge { lhs, op, rhs };
  Json(ChallengeResponse { expected: challenge.answer(), challenge })
}
