//! HTTP surface for the Henrietta registry.
//!
//! Exposes an axum [`Router`] over the lifecycle services in
//! `henrietta-core`, generic over the store and mail transport. TLS, CORS,
//! and request tracing are the caller's responsibility.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/register` | JSON submission; `{"success":true}` or `{"error":..}` |
//! | `GET`  | `/verify-email` | `?token=`; 302 to the site's verify page |
//! | `GET`  | `/unsubscribe` | `?token=`; 302 to the site's unsubscribe page |
//! | `POST` | `/unsubscribe` | One-click unsubscribe from mail clients |
//! | `GET`  | `/health` | Liveness |

pub mod error;
pub mod origin;
pub mod register;
pub mod unsubscribe;
pub mod verify;

use std::sync::Arc;

use axum::{
  Router,
  extract::FromRef,
  http::{StatusCode, header},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use henrietta_core::{
  Context, config::LinkConfig, mail::Mailer, register::Registrar, store::RegistryStore,
  unsubscribe::Unsubscriber, verify::Verifier,
};
use url::Url;

pub use error::ApiError;
pub use origin::{ClientOrigin, OriginPolicy};

/// Shared state threaded through every handler.
pub struct AppState<S, M> {
  pub registrar:    Arc<Registrar<S, M>>,
  pub verifier:     Arc<Verifier<S, M>>,
  pub unsubscriber: Arc<Unsubscriber<S, M>>,
  pub links:        Arc<LinkConfig>,
  pub origin:       OriginPolicy,
}

impl<S, M> AppState<S, M>
where
  S: RegistryStore,
  M: Mailer,
{
  pub fn new(ctx: Context<S, M>) -> Self {
    Self {
      links:        Arc::new(ctx.config.links.clone()),
      origin:       OriginPolicy {
        trust_forwarded_for: ctx.config.rate_limit.trust_forwarded_for,
      },
      registrar:    Arc::new(Registrar::new(ctx.clone())),
      verifier:     Arc::new(Verifier::new(ctx.clone())),
      unsubscriber: Arc::new(Unsubscriber::new(ctx)),
    }
  }
}

impl<S, M> Clone for AppState<S, M> {
  fn clone(&self) -> Self {
    Self {
      registrar:    Arc::clone(&self.registrar),
      verifier:     Arc::clone(&self.verifier),
      unsubscriber: Arc::clone(&self.unsubscriber),
      links:        Arc::clone(&self.links),
      origin:       self.origin,
    }
  }
}

impl<S, M> FromRef<AppState<S, M>> for OriginPolicy {
  fn from_ref(state: &AppState<S, M>) -> Self { state.origin }
}

/// Build the registry router for `state`.
pub fn api_router<S, M>(state: AppState<S, M>) -> Router<()>
where
  S: RegistryStore + 'static,
  M: Mailer + 'static,
{
  Router::new()
    .route("/register", post(register::handler::<S, M>))
    .route("/verify-email", get(verify::handler::<S, M>))
    .route(
      "/unsubscribe",
      get(unsubscribe::redirect::<S, M>).post(unsubscribe::one_click::<S, M>),
    )
    .route("/health", get(health))
    .with_state(state)
}

async fn health() -> &'static str { "ok" }

/// `302 Found` pointing at `location`.
pub(crate) fn found(location: &Url) -> Response {
  (StatusCode::FOUND, [(header::LOCATION, location.as_str().to_owned())]).into_response()
}
