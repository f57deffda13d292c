//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::Method;
use url::Url;

use crate::error::FetchError;

/// How a request was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level document load
  Navigate,
  /// Anything else (scripts, images, data)
  Subresource,
}

/// An outgoing request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      mode: RequestMode::Subresource,
    }
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  #[cfg(test)]
  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }
}

/// A response body and the metadata worth caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub url: String,
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// A response found in a cache generation.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// The generation holding the entry
  pub generation: String,
  /// When the entry was stored
  pub cached_at: DateTime<Utc>,
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult {
  /// The actual response
  pub response: Response,
  /// Where the response came from
  pub source: CacheSource,
  /// When the response was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl CacheResult {
  /// Create a new cache result from fresh network data.
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a matching cached entry.
  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: CacheSource::Cache,
      cached_at: Some(cached.cached_at),
    }
  }

  /// Create a new cache result for the offline navigation shell.
  pub fn offline_shell(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: CacheSource::OfflineShell,
      cached_at: Some(cached.cached_at),
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Entry matching the request from a cache generation
  Cache,
  /// Offline mode - network unavailable, serving the cached root document
  OfflineShell,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheSource::Network => write!(f, "network"),
      CacheSource::Cache => write!(f, "cache"),
      CacheSource::OfflineShell => write!(f, "offline shell"),
    }
  }
}

/// Network capability used by the engine.
///
/// An HTTP error status is still a successful fetch; only failing to get any
/// response at all is an error.
pub trait Fetcher: Send + Sync {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>>;
}
