//! Sliding-window rate limiting keyed by request origin.
//!
//! The window is wall-clock based: an attempt counts against the origin for
//! exactly `window` after it was recorded. Count-then-insert is two store
//! calls, so a burst of concurrent attempts from one origin can overshoot the
//! limit by a few; that is accepted.

use std::sync::Arc;

use crate::{Context, Error, Result, clock::Clock, config::RateLimitConfig, store::RegistryStore};

pub struct RateLimiter<S> {
  store:  Arc<S>,
  config: RateLimitConfig,
  clock:  Arc<dyn Clock>,
}

impl<S: RegistryStore> RateLimiter<S> {
  pub fn new(store: Arc<S>, config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
    Self { store, config, clock }
  }

  pub fn from_context<M>(ctx: &Context<S, M>) -> Self {
    Self::new(Arc::clone(&ctx.store), ctx.config.rate_limit.clone(), Arc::clone(&ctx.clock))
  }

  /// Returns `false` (and records nothing) when `origin` already used up its
  /// attempts in the current window; otherwise records this attempt.
  pub async fn check_and_record(&self, origin: &str) -> Result<bool> {
    let now = self.clock.now();
    let since = now - self.config.window();

    let prior = self
      .store
      .count_rate_limit_events(origin.to_owned(), since)
      .await
      .map_err(Error::store)?;

    if prior >= self.config.max_attempts {
      tracing::warn!(origin, prior, "rate limit exceeded");
      return Ok(false);
    }

    self
      .store
      .record_rate_limit_event(origin.to_owned(), now)
      .await
      .map_err(Error::store)?;
    Ok(true)
  }
}
