//! `GET /unsubscribe?token=` (link in an email) and `POST /unsubscribe?token=`
//! (one-click unsubscribe issued by mail clients).

use axum::{
  Json,
  extract::{Query, State},
  response::Response,
};
use henrietta_core::{mail::Mailer, store::RegistryStore, unsubscribe::UnsubscribeOutcome};
use serde_json::{Value, json};

use crate::{AppState, error::ApiError, found, verify::TokenParams};

const INVALID_LINK: &str = "Invalid unsubscribe link";

/// The `status` values the landing site's unsubscribe page understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribePage {
  Success,
  Invalid,
  Error,
}

impl UnsubscribePage {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Success => "success",
      Self::Invalid => "invalid",
      Self::Error => "error",
    }
  }
}

pub async fn redirect<S, M>(
  State(state): State<AppState<S, M>>,
  Query(params): Query<TokenParams>,
) -> Result<Response, ApiError>
where
  S: RegistryStore,
  M: Mailer,
{
  let page = match state.unsubscriber.unsubscribe(params.token.as_deref()).await {
    Ok(UnsubscribeOutcome::Success) => UnsubscribePage::Success,
    Ok(UnsubscribeOutcome::Invalid) => UnsubscribePage::Invalid,
    Err(e) => {
      tracing::error!(error = %e, "unsubscribe failed");
      UnsubscribePage::Error
    }
  };

  let mut url = state.links.status_page("unsubscribe").map_err(ApiError::internal)?;
  url.query_pairs_mut().append_pair("status", page.as_str());
  Ok(found(&url))
}

pub async fn one_click<S, M>(
  State(state): State<AppState<S, M>>,
  Query(params): Query<TokenParams>,
) -> Result<Json<Value>, ApiError>
where
  S: RegistryStore,
  M: Mailer,
{
  match state
    .unsubscriber
    .unsubscribe(params.token.as_deref())
    .await
    .map_err(ApiError::internal)?
  {
    UnsubscribeOutcome::Success => Ok(Json(json!({ "success": true }))),
    UnsubscribeOutcome::Invalid => Err(ApiError::BadRequest(INVALID_LINK.into())),
  }
}
