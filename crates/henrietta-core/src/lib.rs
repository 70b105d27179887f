//! Core types, trait definitions, and lifecycle services for the Henrietta
//! registry.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! store and the outbound mail transport are consumed through the
//! [`store::RegistryStore`] and [`mail::Mailer`] traits; concrete backends
//! live in sibling crates.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod config;
pub mod contact;
pub mod dedup;
pub mod error;
pub mod mail;
pub mod rate_limit;
pub mod register;
pub mod reminders;
pub mod store;
pub mod token;
pub mod unsubscribe;
pub mod validate;
pub mod verify;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;

pub use error::{Error, Result};

use crate::{clock::Clock, config::RegistryConfig};

/// The collaborators every lifecycle service is built from.
///
/// Cloning is cheap: every field is reference-counted.
pub struct Context<S, M> {
  pub store:  Arc<S>,
  pub mailer: Arc<M>,
  pub config: Arc<RegistryConfig>,
  pub clock:  Arc<dyn Clock>,
}

impl<S, M> Context<S, M> {
  pub fn new(
    store: Arc<S>,
    mailer: Arc<M>,
    config: Arc<RegistryConfig>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self { store, mailer, config, clock }
  }
}

impl<S, M> Clone for Context<S, M> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      mailer: Arc::clone(&self.mailer),
      config: Arc::clone(&self.config),
      clock:  Arc::clone(&self.clock),
    }
  }
}
