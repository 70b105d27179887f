//! `POST /register`

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
};
use henrietta_core::{contact::Submission, mail::Mailer, register::Registration, store::RegistryStore};
use serde_json::{Value, json};

use crate::{AppState, error::ApiError, origin::ClientOrigin};

/// Every accepted outcome, including discarded bots and duplicates, answers
/// with the same body.
pub async fn handler<S, M>(
  State(state): State<AppState<S, M>>,
  ClientOrigin(origin): ClientOrigin,
  body: Result<Json<Submission>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: RegistryStore,
  M: Mailer,
{
  let Json(submission) = body.map_err(|e| {
    tracing::debug!(error = %e, "unreadable registration body");
    ApiError::BadRequest("Invalid request body".into())
  })?;

  match state.registrar.register(submission, &origin).await? {
    Registration::Created { .. }
    | Registration::Refreshed { .. }
    | Registration::AlreadyVerified
    | Registration::ConflictResolved
    | Registration::BotDiscarded => Ok(Json(json!({ "success": true }))),
  }
}
