//! Outbound email: the `Mailer` capability and the templates it delivers.
//!
//! The lifecycle services never build message bodies themselves; they hand
//! an [`EmailTemplate`] and a recipient to a [`Mailer`] after the
//! authoritative state write has committed. Transports call
//! [`EmailTemplate::render`] to obtain subject and bodies.

use std::future::Future;

use crate::contact::ReminderStage;

// ─── Templates ───────────────────────────────────────────────────────────────

/// A transactional email, with the dynamic values it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate {
  /// Double-opt-in invitation carrying the verification link.
  Verification {
    first_name:      Option<String>,
    verify_url:      String,
    unsubscribe_url: String,
  },
  /// Sent once, after a successful verification.
  Welcome {
    first_name:      Option<String>,
    unsubscribe_url: String,
  },
  /// A staged nudge for a contact who has not verified yet.
  Reminder {
    stage:           ReminderStage,
    verify_url:      String,
    unsubscribe_url: String,
  },
}

/// A template rendered for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
  pub subject:          String,
  pub text:             String,
  pub html:             String,
  /// Target for `List-Unsubscribe` / one-click unsubscribe headers.
  pub list_unsubscribe: Option<String>,
}

const SIGNATURE: &str = "Henrietta";

impl EmailTemplate {
  /// Short name used in logs.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Verification { .. } => "verification",
      Self::Welcome { .. } => "welcome",
      Self::Reminder { stage: ReminderStage::First, .. } => "reminder_24h",
      Self::Reminder { stage: ReminderStage::Second, .. } => "reminder_72h",
      Self::Reminder { stage: ReminderStage::Final, .. } => "reminder_final",
    }
  }

  pub fn subject(&self) -> &'static str {
    match self {
      Self::Verification { .. } => "An invitation to something different",
      Self::Welcome { .. } => "You are in",
      Self::Reminder { stage: ReminderStage::First, .. } => "Quick reminder",
      Self::Reminder { stage: ReminderStage::Second, .. } => "Still interested?",
      Self::Reminder { stage: ReminderStage::Final, .. } => "Your signup expires tomorrow",
    }
  }

  pub fn render(&self) -> RenderedEmail {
    let (paragraphs, action, unsubscribe_url, salutation) = match self {
      Self::Verification { first_name, verify_url, unsubscribe_url } => (
        vec![
          "You asked to be part of what we are building.",
          "We do not take that lightly.",
        ],
        Some(("Verify my email", verify_url.as_str())),
        unsubscribe_url,
        Some(greeting(first_name.as_deref())),
      ),
      Self::Welcome { first_name, unsubscribe_url } => (
        vec![
          "You are in. Your email is verified and you are now part of the Henrietta registry.",
          "We will reach out only when something real happens: a pilot, a finding, or a \
           chance to help shape what we are building.",
          "Until then, we are heads down working.",
        ],
        None,
        unsubscribe_url,
        Some(greeting(first_name.as_deref())),
      ),
      Self::Reminder { stage, verify_url, unsubscribe_url } => (
        reminder_copy(*stage),
        Some(("Verify my email", verify_url.as_str())),
        unsubscribe_url,
        None,
      ),
    };

    let mut text = String::new();
    let mut html = String::from(
      "<!DOCTYPE html>\n<html>\n<body style=\"font-family: -apple-system, \
       BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6;\">\n",
    );

    if let Some(g) = &salutation {
      text.push_str(&format!("{g}\n\n"));
      html.push_str(&format!("<p>{}</p>\n", escape_html(g)));
    }
    for p in &paragraphs {
      text.push_str(&format!("{p}\n\n"));
      html.push_str(&format!("<p>{}</p>\n", escape_html(p)));
    }
    if let Some((label, href)) = action {
      text.push_str(&format!("{label}: {href}\n\n"));
      html.push_str(&format!(
        "<p><a href=\"{}\">{}</a></p>\n",
        escape_html(href),
        escape_html(label)
      ));
    }
    text.push_str(&format!(
      "{SIGNATURE}\n\n---\n\nIf this ever stops feeling relevant, you can step out here: \
       {unsubscribe_url}\n"
    ));
    html.push_str(&format!(
      "<p>{SIGNATURE}</p>\n<p style=\"color: #888888; font-size: 13px;\">If this ever stops \
       feeling relevant, you can <a href=\"{}\">step out here</a>.</p>\n</body>\n</html>\n",
      escape_html(unsubscribe_url)
    ));

    let list_unsubscribe = match self {
      Self::Reminder { unsubscribe_url, .. } => Some(unsubscribe_url.clone()),
      _ => None,
    };

    RenderedEmail { subject: self.subject().to_string(), text, html, list_unsubscribe }
  }
}

fn greeting(first_name: Option<&str>) -> String {
  match first_name {
    Some(name) => format!("Hi {name},"),
    None => "Hi,".to_string(),
  }
}

fn reminder_copy(stage: ReminderStage) -> Vec<&'static str> {
  match stage {
    ReminderStage::First => vec![
      "A day ago you asked to join the Henrietta registry, but your email is not verified yet.",
      "One click and you are in.",
    ],
    ReminderStage::Second => vec![
      "Your signup is still waiting on one step.",
      "If you still want in, verify your email below. If not, no hard feelings.",
    ],
    ReminderStage::Final => vec![
      "This is the last reminder.",
      "If your email is not verified by tomorrow, we will delete your signup and not contact \
       you again.",
    ],
  }
}

fn escape_html(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  for c in raw.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      c => out.push(c),
    }
  }
  out
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// What a transport reports back for an accepted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
  pub provider_message_id: Option<String>,
}

/// The outbound email capability. Implementations may fail transiently;
/// callers decide whether a failure matters.
pub trait Mailer: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn send<'a>(
    &'a self,
    to: &'a str,
    template: &'a EmailTemplate,
  ) -> impl Future<Output = Result<Delivery, Self::Error>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn verification_carries_link_and_greeting() {
    let t = EmailTemplate::Verification {
      first_name:      Some("Ada".into()),
      verify_url:      "https://api.example/verify-email?token=abc".into(),
      unsubscribe_url: "https://api.example/unsubscribe?token=xyz".into(),
    };
    let r = t.render();
    assert_eq!(r.subject, "An invitation to something different");
    assert!(r.text.starts_with("Hi Ada,"));
    assert!(r.text.contains("https://api.example/verify-email?token=abc"));
    assert!(r.html.contains("href=\"https://api.example/verify-email?token=abc\""));
    assert!(r.text.contains("https://api.example/unsubscribe?token=xyz"));
    assert_eq!(r.list_unsubscribe, None);
  }

  #[test]
  fn welcome_without_name() {
    let t = EmailTemplate::Welcome { first_name: None, unsubscribe_url: "u".into() };
    let r = t.render();
    assert!(r.text.starts_with("Hi,"));
    assert_eq!(r.subject, "You are in");
  }

  #[test]
  fn reminders_have_stage_subjects_and_unsubscribe_header() {
    let subjects: Vec<_> = ReminderStage::ALL
      .into_iter()
      .map(|stage| EmailTemplate::Reminder {
        stage,
        verify_url: "v".into(),
        unsubscribe_url: "u".into(),
      })
      .map(|t| {
        let r = t.render();
        assert_eq!(r.list_unsubscribe.as_deref(), Some("u"));
        r.subject
      })
      .collect();
    assert_eq!(subjects, ["Quick reminder", "Still interested?", "Your signup expires tomorrow"]);
  }

  #[test]
  fn names_are_escaped_in_html() {
    let t = EmailTemplate::Welcome {
      first_name:      Some("<b>Eve</b>".into()),
      unsubscribe_url: "u".into(),
    };
    let r = t.render();
    assert!(r.html.contains("Hi &lt;b&gt;Eve&lt;/b&gt;,"));
    assert!(!r.html.contains("<b>Eve"));
  }
}
