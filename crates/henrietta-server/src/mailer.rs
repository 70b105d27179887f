//! [`ResendMailer`]: delivers [`EmailTemplate`]s through the Resend HTTP API.

use std::{collections::BTreeMap, time::Duration};

use henrietta_core::mail::{Delivery, EmailTemplate, Mailer, RenderedEmail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("provider rejected message ({status}): {body}")]
  Rejected { status: u16, body: String },
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ResendMailer {
  client:   Client,
  endpoint: String,
  api_key:  String,
  from:     String,
  reply_to: Option<String>,
}

impl ResendMailer {
  pub fn new(config: &MailConfig) -> Result<Self, MailError> {
    let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
    Ok(Self {
      client,
      endpoint: format!("{}/emails", config.api_url.trim_end_matches('/')),
      api_key: config.api_key.clone(),
      from: config.from.clone(),
      reply_to: config.reply_to.clone(),
    })
  }

  fn request_body<'a>(&'a self, to: &'a str, rendered: &'a RenderedEmail) -> SendRequest<'a> {
    let mut headers = BTreeMap::new();
    if let Some(target) = &rendered.list_unsubscribe {
      headers.insert("List-Unsubscribe", format!("<{target}>"));
      headers.insert("List-Unsubscribe-Post", "List-Unsubscribe=One-Click".to_string());
    }
    SendRequest {
      from: &self.from,
      to: [to],
      reply_to: self.reply_to.as_deref(),
      subject: &rendered.subject,
      html: &rendered.html,
      text: &rendered.text,
      headers,
    }
  }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
  from:     &'a str,
  to:       [&'a str; 1],
  #[serde(skip_serializing_if = "Option::is_none")]
  reply_to: Option<&'a str>,
  subject:  &'a str,
  html:     &'a str,
  text:     &'a str,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  headers:  BTreeMap<&'static str, String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
  id: Option<String>,
}

impl Mailer for ResendMailer {
  type Error = MailError;

  async fn send<'a>(
    &'a self,
    to: &'a str,
    template: &'a EmailTemplate,
  ) -> Result<Delivery, MailError> {
    let rendered = template.render();
    let body = self.request_body(to, &rendered);

    let resp = self
      .client
      .post(&self.endpoint)
      .bearer_auth(&self.api_key)
      .json(&body)
      .send()
      .await?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(MailError::Rejected { status: status.as_u16(), body });
    }

    let parsed: SendResponse = resp.json().await?;
    tracing::debug!(kind = template.kind(), id = ?parsed.id, "email accepted by provider");
    Ok(Delivery { provider_message_id: parsed.id })
  }
}
