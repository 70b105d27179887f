//! `GET /verify-email?token=`

use axum::{
  extract::{Query, State},
  response::Response,
};
use henrietta_core::{mail::Mailer, store::RegistryStore, verify::VerifyOutcome};
use serde::Deserialize;

use crate::{AppState, error::ApiError, found};

#[derive(Debug, Deserialize)]
pub struct TokenParams {
  pub token: Option<String>,
}

/// The `status` values the landing site's verify page understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyPage {
  Success,
  AlreadyVerified,
  Expired,
  Invalid,
  Error,
}

impl VerifyPage {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Success => "success",
      Self::AlreadyVerified => "already-verified",
      Self::Expired => "expired",
      Self::Invalid => "invalid",
      Self::Error => "error",
    }
  }
}

impl From<&VerifyOutcome> for VerifyPage {
  fn from(outcome: &VerifyOutcome) -> Self {
    match outcome {
      VerifyOutcome::Success { .. } => Self::Success,
      VerifyOutcome::AlreadyVerified => Self::AlreadyVerified,
      VerifyOutcome::Expired => Self::Expired,
      // Consumed, rotated, and unknown tokens look alike on purpose.
      VerifyOutcome::NotFound | VerifyOutcome::Invalid => Self::Invalid,
    }
  }
}

pub async fn handler<S, M>(
  State(state): State<AppState<S, M>>,
  Query(params): Query<TokenParams>,
) -> Result<Response, ApiError>
where
  S: RegistryStore,
  M: Mailer,
{
  let (page, name) = match state.verifier.verify(params.token.as_deref()).await {
    Ok(outcome) => {
      let name = match &outcome {
        VerifyOutcome::Success { first_name } => first_name.clone(),
        _ => None,
      };
      (VerifyPage::from(&outcome), name)
    }
    Err(e) => {
      tracing::error!(error = %e, "verification failed");
      (VerifyPage::Error, None)
    }
  };

  let mut url = state.links.status_page("verify").map_err(ApiError::internal)?;
  {
    let mut query = url.query_pairs_mut();
    query.append_pair("status", page.as_str());
    if let Some(name) = &name {
      query.append_pair("name", name);
    }
  }
  Ok(found(&url))
}
