//! The authoritative server, as seen by the sync layer.

mod http;

#[cfg(test)]
pub mod fake;

pub use http::HttpRemote;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::profile::ProfileInput;

/// What the server knows about the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  #[serde(default)]
  pub authenticated: bool,
  #[serde(default)]
  pub profile: Option<ProfileInput>,
  #[serde(default)]
  pub favorites: Option<Vec<String>>,
}

/// Remote profile/favourites/catalogue API.
///
/// Every call reports "succeeded" or a [`RemoteError`]; 401 answers surface as
/// [`RemoteError::Unauthorized`].
pub trait RemoteApi: Send + Sync {
  /// Read the current session. Idempotent, no server-side effects.
  fn fetch_session(&self) -> BoxFuture<'_, Result<Session, RemoteError>>;

  /// Replace the server-side favourites with `favorites`.
  fn push_favorites(&self, favorites: Vec<String>) -> BoxFuture<'_, Result<(), RemoteError>>;

  /// Fetch the drill catalogue. Idempotent and cacheable.
  fn fetch_catalogue(&self) -> BoxFuture<'_, Result<serde_json::Value, RemoteError>>;

  /// End the server-side session.
  fn logout(&self) -> BoxFuture<'_, Result<(), RemoteError>>;
}
