//! Key/value backends for the durable store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::StoreError;

/// A raw string key/value medium.
///
/// Backends report every failure; [`DurableStore`](super::DurableStore) decides
/// what to do with it.
pub trait StorageBackend: Send + Sync {
  /// Get the raw payload stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

  /// Replace the payload stored under `key`.
  fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

  /// Delete `key`. Deleting a missing key is not an error.
  fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    (**self).get(key)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    (**self).set(key, value)
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    (**self).remove(key)
  }
}

/// Process-local backend used for ephemeral sessions and tests.
#[derive(Default)]
pub struct MemoryBackend {
  entries: Mutex<HashMap<String, String>>,
  unavailable: Mutex<Option<String>>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every subsequent operation fail, as a full or disabled medium would.
  #[cfg(test)]
  pub fn set_unavailable(&self, reason: Option<&str>) {
    if let Ok(mut guard) = self.unavailable.lock() {
      *guard = reason.map(String::from);
    }
  }

  /// Plant a raw payload, bypassing JSON encoding.
  #[cfg(test)]
  pub fn insert_raw(&self, key: &str, raw: &str) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.insert(key.to_string(), raw.to_string());
    }
  }

  fn check_available(&self) -> Result<(), StoreError> {
    let guard = self.unavailable.lock().map_err(|_| StoreError::Poisoned)?;
    match guard.as_ref() {
      Some(reason) => Err(StoreError::Unavailable(reason.clone())),
      None => Ok(()),
    }
  }
}

impl StorageBackend for MemoryBackend {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    self.check_available()?;
    let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    self.check_available()?;
    let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    self.check_available()?;
    let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    entries.remove(key);
    Ok(())
  }
}
