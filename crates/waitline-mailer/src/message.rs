//! Message assembly and shared send plumbing for both relay variants.

use lettre::{
  AsyncSmtpTransport, AsyncTransport as _, Message, Tokio1Executor,
  message::{Mailbox, MultiPart},
};
use uuid::Uuid;

use waitline_core::{
  bounce,
  mailer::{OutboundEmail, SendFailure, SendReceipt},
};

/// Build the RFC 5322 message plus the Message-ID we assigned to it.
pub(crate) fn build_message(
  from: &Mailbox,
  email: &OutboundEmail,
) -> Result<(Message, String), SendFailure> {
  let to: Mailbox = email.to.parse().map_err(|e| SendFailure {
    code:        "invalid_recipient".into(),
    message:     format!("invalid recipient address: {e}"),
    // A syntactically unusable address can never receive mail.
    hard_bounce: true,
  })?;

  let message_id = format!("<{}@{}>", Uuid::new_v4(), from.email.domain());

  let message = Message::builder()
    .from(from.clone())
    .to(to)
    .subject(email.subject.clone())
    .message_id(Some(message_id.clone()))
    .multipart(MultiPart::alternative_plain_html(
      email.text_body.clone(),
      email.html_body.clone(),
    ))
    .map_err(|e| SendFailure {
      code:        "message_build".into(),
      message:     e.to_string(),
      hard_bounce: false,
    })?;

  Ok((message, message_id))
}

/// Map a transport error to a classified [`SendFailure`]. The full source
/// chain is flattened into the message so the bounce classifier sees the
/// server's response text.
pub(crate) fn smtp_failure(error: &lettre::transport::smtp::Error) -> SendFailure {
  let mut message = error.to_string();
  let mut source = std::error::Error::source(error);
  while let Some(cause) = source {
    message.push_str(": ");
    message.push_str(&cause.to_string());
    source = cause.source();
  }

  let code = if error.is_permanent() {
    "smtp_permanent"
  } else if error.is_transient() {
    "smtp_transient"
  } else {
    "smtp_connection"
  };

  SendFailure {
    code:        code.into(),
    hard_bounce: bounce::is_hard_bounce(&message),
    message,
  }
}

/// One best-effort delivery over an already-built transport.
pub(crate) async fn deliver(
  transport: &AsyncSmtpTransport<Tokio1Executor>,
  from: &Mailbox,
  email: &OutboundEmail,
) -> Result<SendReceipt, SendFailure> {
  let (message, message_id) = build_message(from, email)?;
  match transport.send(message).await {
    Ok(_) => Ok(SendReceipt { message_id }),
    Err(e) => Err(smtp_failure(&e)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn outbound(to: &str) -> OutboundEmail {
    OutboundEmail {
      to:            to.to_string(),
      to_normalized: to.to_lowercase(),
      template_name: "welcome".into(),
      subject:       "You're on the waitlist!".into(),
      html_body:     "<p>hello</p>".into(),
      text_body:     "hello".into(),
    }
  }

  fn from() -> Mailbox {
    "Waitline <hello@waitline.example>".parse().unwrap()
  }

  #[test]
  fn builds_multipart_message_with_assigned_id() {
    let (message, message_id) = build_message(&from(), &outbound("a@example.com")).unwrap();
    assert!(message_id.ends_with("@waitline.example>"));

    let rendered = String::from_utf8(message.formatted()).unwrap();
    assert!(rendered.contains("You're on the waitlist!"));
    assert!(rendered.contains("multipart/alternative"));
    assert!(rendered.contains("hello"));
    assert!(rendered.contains(&message_id));
  }

  #[test]
  fn unparseable_recipient_is_a_hard_failure() {
    let err = build_message(&from(), &outbound("not an address")).unwrap_err();
    assert_eq!(err.code, "invalid_recipient");
    assert!(err.hard_bounce);
  }
}
