//! Extractor for the requester identity used by rate limiting.
//!
//! Behind a proxy every request shares the proxy's socket address, so the
//! forwarded header is the only usable identity there. Any client can write
//! that header, though, so it is honoured only when [`OriginPolicy`] says
//! the deployment sits behind a proxy that overwrites it.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
  extract::{ConnectInfo, FromRef, FromRequestParts},
  http::request::Parts,
};

const UNKNOWN: &str = "unknown";

/// Whether `X-Forwarded-For` may be trusted. Pulled out of router state via
/// [`FromRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginPolicy {
  pub trust_forwarded_for: bool,
}

/// The first `X-Forwarded-For` hop if trusted and present, else the socket
/// peer address, else `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOrigin(pub String);

impl<S> FromRequestParts<S> for ClientOrigin
where
  S: Send + Sync,
  OriginPolicy: FromRef<S>,
{
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    let policy = OriginPolicy::from_ref(state);

    let forwarded = policy
      .trust_forwarded_for
      .then(|| parts.headers.get("x-forwarded-for"))
      .flatten()
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.split(',').next())
      .map(str::trim)
      .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
      return Ok(Self(ip.to_string()));
    }

    let peer = parts
      .extensions
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| addr.ip().to_string());

    Ok(Self(peer.unwrap_or_else(|| UNKNOWN.to_string())))
  }
}
