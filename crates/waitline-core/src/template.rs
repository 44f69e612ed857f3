//! Message templates for outbound email.
//!
//! Rendering is plain string assembly; the only template today is the
//! welcome message sent once per new subscriber.

/// Template name recorded on delivery rows.
pub const WELCOME: &str = "welcome";

/// A rendered message body, transport-agnostic.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
  pub subject: String,
  pub html:    String,
  pub text:    String,
}

/// Render the welcome email, personalised with the subscriber's waitlist
/// rank when known.
pub fn welcome(position: Option<u64>, total: Option<u64>) -> RenderedEmail {
  let subject = "You're on the waitlist!".to_string();

  let rank_html = match (position, total) {
    (Some(p), Some(t)) => format!(
      "<p class=\"rank\"><strong>Your position:</strong> #{p} of {t} early subscribers.</p>"
    ),
    _ => String::new(),
  };
  let rank_text = match (position, total) {
    (Some(p), Some(t)) => format!("Your position: #{p} of {t} early subscribers.\n\n"),
    _ => String::new(),
  };

  let html = format!(
    "<!DOCTYPE html>\n\
     <html lang=\"en\">\n\
     <head>\n\
       <meta charset=\"utf-8\">\n\
       <style>\n\
         body {{ font-family: sans-serif; color: #333; line-height: 1.5; }}\n\
         .wrap {{ max-width: 560px; margin: 0 auto; padding: 24px; }}\n\
         .rank {{ background: #f6f6f6; border-left: 4px solid #555; padding: 12px 16px; }}\n\
       </style>\n\
     </head>\n\
     <body>\n\
       <div class=\"wrap\">\n\
         <h1>You're on the list</h1>\n\
         <p>Thanks for joining the waitlist — your spot is confirmed.</p>\n\
         {rank_html}\n\
         <p>We'll email you as soon as early access opens. No action needed\n\
            until then; just keep an eye on your inbox.</p>\n\
         <p>Have a question? Reply to this email and a human will answer.</p>\n\
       </div>\n\
     </body>\n\
     </html>\n"
  );

  let text = format!(
    "You're on the list!\n\n\
     Thanks for joining the waitlist — your spot is confirmed.\n\n\
     {rank_text}\
     We'll email you as soon as early access opens. No action needed until\n\
     then; just keep an eye on your inbox.\n\n\
     Have a question? Reply to this email and a human will answer.\n"
  );

  RenderedEmail { subject, html, text }
}
