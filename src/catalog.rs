//! Drill catalogue access with an offline snapshot.
//!
//! The first catalogue obtained in a process is reused for its lifetime.
//! Every network success refreshes the persisted snapshot; a network failure
//! falls back to that snapshot, and only fails when there is none.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::RemoteError;
use crate::remote::RemoteApi;
use crate::store::{DurableStore, CATALOG_KEY};

/// Where a catalogue came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
  Network,
  /// Persisted copy of an earlier successful fetch
  Snapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
  pub data: Value,
  pub source: CatalogSource,
}

#[derive(Clone)]
pub struct CatalogService {
  remote: Arc<dyn RemoteApi>,
  store: DurableStore,
  loaded: Arc<OnceCell<Catalog>>,
}

impl CatalogService {
  pub fn new(remote: Arc<dyn RemoteApi>, store: DurableStore) -> Self {
    Self {
      remote,
      store,
      loaded: Arc::new(OnceCell::new()),
    }
  }

  /// Get the catalogue, loading it on first use. Concurrent first calls share
  /// one load.
  pub async fn fetch_catalogue(&self) -> Result<Catalog, RemoteError> {
    self
      .loaded
      .get_or_try_init(|| self.load())
      .await
      .cloned()
  }

  /// Last persisted catalogue, if any.
  pub fn cached_catalogue(&self) -> Option<Value> {
    self.store.read(CATALOG_KEY, &None)
  }

  async fn load(&self) -> Result<Catalog, RemoteError> {
    match self.remote.fetch_catalogue().await {
      Ok(data) => {
        self.store.write(CATALOG_KEY, &data);
        Ok(Catalog {
          data,
          source: CatalogSource::Network,
        })
      }
      Err(e) => match self.cached_catalogue() {
        Some(data) => {
          info!(error = %e, "falling back to cached catalogue");
          Ok(Catalog {
            data,
            source: CatalogSource::Snapshot,
          })
        }
        None => {
          warn!(error = %e, "catalogue unavailable and nothing cached");
          Err(e)
        }
      },
    }
  }
}
