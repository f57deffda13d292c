//! Durable local state.
//!
//! [`DurableStore`] wraps a [`StorageBackend`] with JSON encoding and a strict
//! never-fail contract: reads degrade to a caller-supplied fallback and writes
//! that cannot be persisted are logged and dropped. Higher layers treat
//! persistence as best-effort.

mod backend;
mod sqlite;

pub use backend::{MemoryBackend, StorageBackend};
pub use sqlite::SqliteBackend;

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::error::StoreError;

/// Persisted favourites list.
pub const FAVORITES_KEY: &str = "hooptutor:favorites";
/// Persisted profile record.
pub const PROFILE_KEY: &str = "hooptutor:profile";
/// Last successfully fetched catalogue.
pub const CATALOG_KEY: &str = "hooptutor:catalog";

/// JSON key/value store whose operations never fail.
#[derive(Clone)]
pub struct DurableStore {
  backend: Arc<dyn StorageBackend>,
}

impl DurableStore {
  pub fn new(backend: impl StorageBackend + 'static) -> Self {
    Self {
      backend: Arc::new(backend),
    }
  }

  /// Read `key`, or a fresh copy of `fallback` if it is missing or unreadable.
  pub fn read<T: DeserializeOwned + Clone>(&self, key: &str, fallback: &T) -> T {
    match self.try_read(key) {
      Ok(Some(value)) => value,
      Ok(None) => fallback.clone(),
      Err(e) => {
        warn!(key, error = %e, "unable to read stored value, using fallback");
        fallback.clone()
      }
    }
  }

  /// Persist `value` under `key`. Failures are logged and the write is dropped.
  pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
    if let Err(e) = self.try_write(key, value) {
      warn!(key, error = %e, "unable to persist value, write dropped");
    }
  }

  /// Delete `key`. Failures are logged and ignored.
  pub fn remove(&self, key: &str) {
    if let Err(e) = self.backend.remove(key) {
      warn!(key, error = %e, "unable to remove stored value");
    }
  }

  fn try_read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
    match self.backend.get(key)? {
      Some(raw) if !raw.trim().is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
      _ => Ok(None),
    }
  }

  fn try_write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    self.backend.set(key, &raw)
  }
}
