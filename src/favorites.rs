//! Favourited drill identifiers.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::{Change, ChangeBus, Subscription};
use crate::error::RemoteError;
use crate::store::{DurableStore, FAVORITES_KEY};

/// Deduplicated list of favourited ids.
///
/// Order is first-occurrence order but carries no meaning. Empty ids are
/// dropped on construction, so every value of this type is clean.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FavoriteSet(Vec<String>);

impl FavoriteSet {
  pub fn from_ids<I, S>(ids: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut unique: Vec<String> = Vec::new();
    for id in ids.into_iter().map(Into::into) {
      if !id.is_empty() && !unique.contains(&id) {
        unique.push(id);
      }
    }
    Self(unique)
  }

  pub fn contains(&self, id: &str) -> bool {
    self.0.iter().any(|f| f == id)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }

  pub fn to_vec(&self) -> Vec<String> {
    self.0.clone()
  }
}

impl From<Vec<String>> for FavoriteSet {
  fn from(ids: Vec<String>) -> Self {
    Self::from_ids(ids)
  }
}

impl From<FavoriteSet> for Vec<String> {
  fn from(set: FavoriteSet) -> Self {
    set.0
  }
}

/// Whether a favourites write is forwarded to the remote sync delegate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncMode {
  /// Forward to the delegate, if one is registered.
  #[default]
  Push,
  /// Keep the change local (server-sourced data, logout clears).
  LocalOnly,
}

/// Result of [`FavoritesStore::toggle_favorite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggle {
  pub favorites: FavoriteSet,
  /// Whether the toggled id is now a favourite.
  pub active: bool,
}

/// Pushes the full favourites list to the server.
pub type SyncDelegate =
  Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, Result<(), RemoteError>> + Send + Sync>;

struct Inner {
  store: DurableStore,
  bus: ChangeBus,
  delegate: Mutex<Option<SyncDelegate>>,
  in_flight: Mutex<Vec<JoinHandle<()>>>,
}

/// Favourites state: persisted locally, published on the bus and optionally
/// mirrored to the server.
#[derive(Clone)]
pub struct FavoritesStore {
  inner: Arc<Inner>,
}

impl FavoritesStore {
  pub fn new(store: DurableStore, bus: ChangeBus) -> Self {
    Self {
      inner: Arc::new(Inner {
        store,
        bus,
        delegate: Mutex::new(None),
        in_flight: Mutex::new(Vec::new()),
      }),
    }
  }

  /// Current favourites, read through from the durable store.
  pub fn get_favorites(&self) -> FavoriteSet {
    self.inner.store.read(FAVORITES_KEY, &FavoriteSet::default())
  }

  /// Replace the favourites with `ids`, then persist, publish and maybe push.
  pub fn set_favorites<I, S>(&self, ids: I, sync: SyncMode) -> FavoriteSet
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let favorites = FavoriteSet::from_ids(ids);
    self.inner.store.write(FAVORITES_KEY, &favorites);
    self.inner.bus.publish(Change::Favorites(favorites.clone()));

    if sync == SyncMode::Push {
      self.dispatch_sync(&favorites);
    }
    favorites
  }

  /// Flip membership of `id` against the currently persisted set.
  pub fn toggle_favorite(&self, id: &str) -> Toggle {
    let mut ids = self.get_favorites().to_vec();
    let active = if let Some(pos) = ids.iter().position(|f| f == id) {
      ids.remove(pos);
      false
    } else {
      ids.push(id.to_string());
      true
    };

    let favorites = self.set_favorites(ids, SyncMode::Push);
    Toggle {
      active: active && favorites.contains(id),
      favorites,
    }
  }

  /// Forget every favourite.
  pub fn clear_favorites(&self, sync: SyncMode) -> FavoriteSet {
    self.set_favorites(Vec::<String>::new(), sync)
  }

  /// Install the delegate used for [`SyncMode::Push`] writes, replacing any prior one.
  pub fn register_remote_sync_delegate<F, Fut>(&self, delegate: F)
  where
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RemoteError>> + Send + 'static,
  {
    let delegate: SyncDelegate = Arc::new(
      move |favorites: Vec<String>| -> BoxFuture<'static, Result<(), RemoteError>> {
        Box::pin(delegate(favorites))
      },
    );
    match self.inner.delegate.lock() {
      Ok(mut slot) => *slot = Some(delegate),
      Err(_) => warn!("favourites delegate slot poisoned, delegate not installed"),
    }
  }

  /// Subscribe to favourites changes. `callback` runs immediately with the
  /// current value.
  pub fn subscribe<F>(&self, callback: F) -> Subscription
  where
    F: Fn(&FavoriteSet) + Send + Sync + 'static,
  {
    self
      .inner
      .bus
      .subscribe_with_current(Change::Favorites(self.get_favorites()), move |change| {
        if let Change::Favorites(favorites) = change {
          callback(favorites);
        }
      })
  }

  /// Wait for every remote push started so far.
  pub async fn flush(&self) {
    let pending: Vec<JoinHandle<()>> = match self.inner.in_flight.lock() {
      Ok(mut in_flight) => in_flight.drain(..).collect(),
      Err(_) => return,
    };
    for handle in pending {
      if let Err(e) = handle.await {
        warn!(error = %e, "remote favourites sync task aborted");
      }
    }
  }

  /// Spawn the delegate with `favorites`. Failures end in the log, never at
  /// the caller.
  fn dispatch_sync(&self, favorites: &FavoriteSet) {
    let delegate = match self.inner.delegate.lock() {
      Ok(slot) => slot.clone(),
      Err(_) => None,
    };
    let Some(delegate) = delegate else {
      return;
    };

    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      warn!("no async runtime available, remote favourites sync skipped");
      return;
    };

    let count = favorites.len();
    let push = delegate(favorites.to_vec());
    let handle = runtime.spawn(async move {
      match push.await {
        Ok(()) => debug!(count, "favourites pushed to server"),
        Err(e) => warn!(error = %e, "remote favourites sync failed"),
      }
    });

    if let Ok(mut in_flight) = self.inner.in_flight.lock() {
      in_flight.retain(|h| !h.is_finished());
      in_flight.push(handle);
    }
  }
}
