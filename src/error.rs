//! Typed errors for the storage, remote and cache layers.
//!
//! None of these are fatal. Persistence faults are swallowed by
//! [`DurableStore`](crate::store::DurableStore), sync faults by the favourites
//! delegate dispatch, and only cache-first misses and authentication faults
//! ever reach a caller.

use thiserror::Error;

/// Errors raised by a persistent key/value backend.
#[derive(Debug, Error)]
pub enum StoreError {
  /// The SQLite backend rejected the operation.
  #[error("storage backend error: {0}")]
  Backend(#[from] rusqlite::Error),

  /// The stored payload could not be (de)serialized.
  #[error("invalid JSON payload: {0}")]
  Json(#[from] serde_json::Error),

  /// The connection mutex was poisoned by a panicking holder.
  #[error("storage lock poisoned")]
  Poisoned,

  /// Storage has been disabled (e.g. a read-only or unavailable medium).
  #[error("storage unavailable: {0}")]
  Unavailable(String),
}

/// Errors from the remote profile/favourites/catalogue API.
#[derive(Debug, Error)]
pub enum RemoteError {
  /// The server answered 401; the caller should prompt re-authentication.
  #[error("not authenticated")]
  Unauthorized,

  /// The server answered with a non-success HTTP status.
  #[error("server returned HTTP {0}")]
  Status(u16),

  /// The request never produced a response.
  #[error("network error: {0}")]
  Network(String),

  /// The response body did not match the expected shape.
  #[error("malformed response: {0}")]
  Decode(String),
}

impl RemoteError {
  pub fn is_unauthorized(&self) -> bool {
    matches!(self, RemoteError::Unauthorized)
  }
}

impl From<reqwest::Error> for RemoteError {
  fn from(e: reqwest::Error) -> Self {
    if let Some(status) = e.status() {
      if status == reqwest::StatusCode::UNAUTHORIZED {
        return RemoteError::Unauthorized;
      }
      return RemoteError::Status(status.as_u16());
    }
    if e.is_decode() {
      return RemoteError::Decode(e.to_string());
    }
    RemoteError::Network(e.to_string())
  }
}

/// Errors from the cache-strategy engine.
#[derive(Debug, Error)]
pub enum FetchError {
  /// The network could not be reached.
  #[error("network request for {url} failed: {reason}")]
  Network { url: String, reason: String },

  /// A manifest entry could not be installed.
  #[error("failed to install {url}: {reason}")]
  Install { url: String, reason: String },

  /// The current generation has not been installed yet.
  #[error("cache generation {0} is not installed")]
  NotInstalled(String),

  /// A manifest path or shell path does not resolve against the origin.
  #[error("invalid url {0}")]
  InvalidUrl(String),

  /// The generation storage failed.
  #[error(transparent)]
  Storage(#[from] StoreError),
}
