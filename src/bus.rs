//! Process-wide change notification.
//!
//! Stores publish a [`Change`] after every write; presentation code subscribes
//! per [`Topic`]. Delivery is synchronous and in subscription order. A
//! subscriber that panics is logged and skipped so the others still see the
//! value.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

use crate::favorites::FavoriteSet;
use crate::profile::Profile;

/// Notification channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
  Favorites,
  Profile,
}

impl std::fmt::Display for Topic {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Topic::Favorites => write!(f, "favorites"),
      Topic::Profile => write!(f, "profile"),
    }
  }
}

/// A published value. Always the full current value, never a delta.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
  Favorites(FavoriteSet),
  Profile(Profile),
}

impl Change {
  pub fn topic(&self) -> Topic {
    match self {
      Change::Favorites(_) => Topic::Favorites,
      Change::Profile(_) => Topic::Profile,
    }
  }
}

type Callback = Arc<dyn Fn(&Change) + Send + Sync>;

struct Subscriber {
  id: u64,
  topic: Topic,
  callback: Callback,
}

#[derive(Default)]
struct BusInner {
  next_id: AtomicU64,
  subscribers: Mutex<Vec<Subscriber>>,
}

/// Topic-keyed publish/subscribe hub.
#[derive(Clone, Default)]
pub struct ChangeBus {
  inner: Arc<BusInner>,
}

impl ChangeBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `callback` for every future publish on `topic`.
  pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
  where
    F: Fn(&Change) + Send + Sync + 'static,
  {
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    match self.inner.subscribers.lock() {
      Ok(mut subscribers) => subscribers.push(Subscriber {
        id,
        topic,
        callback: Arc::new(callback),
      }),
      Err(_) => warn!(%topic, "subscriber list poisoned, subscription ignored"),
    }

    Subscription {
      bus: Arc::downgrade(&self.inner),
      id,
    }
  }

  /// Register `callback` and immediately hand it `current`.
  pub fn subscribe_with_current<F>(&self, current: Change, callback: F) -> Subscription
  where
    F: Fn(&Change) + Send + Sync + 'static,
  {
    let callback: Callback = Arc::new(callback);
    let registered = Arc::clone(&callback);
    let subscription = self.subscribe(current.topic(), move |change| registered(change));
    deliver(&callback, &current);
    subscription
  }

  /// Deliver `change` to every subscriber of its topic.
  pub fn publish(&self, change: Change) {
    let topic = change.topic();

    // Snapshot so callbacks may subscribe or unsubscribe while being notified
    let callbacks: Vec<Callback> = match self.inner.subscribers.lock() {
      Ok(subscribers) => subscribers
        .iter()
        .filter(|s| s.topic == topic)
        .map(|s| Arc::clone(&s.callback))
        .collect(),
      Err(_) => {
        warn!(%topic, "subscriber list poisoned, publish dropped");
        return;
      }
    };

    debug!(%topic, subscribers = callbacks.len(), "publishing change");
    for callback in &callbacks {
      deliver(callback, &change);
    }
  }

  /// Number of live subscribers on `topic`.
  #[cfg(test)]
  pub fn subscriber_count(&self, topic: Topic) -> usize {
    self
      .inner
      .subscribers
      .lock()
      .map(|s| s.iter().filter(|s| s.topic == topic).count())
      .unwrap_or(0)
  }
}

fn deliver(callback: &Callback, change: &Change) {
  if panic::catch_unwind(AssertUnwindSafe(|| callback(change))).is_err() {
    warn!(topic = %change.topic(), "subscriber panicked, continuing delivery");
  }
}

/// Handle returned by [`ChangeBus::subscribe`].
///
/// Dropping the handle leaves the subscription in place; call
/// [`unsubscribe`](Subscription::unsubscribe) to stop delivery.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
  bus: Weak<BusInner>,
  id: u64,
}

impl Subscription {
  pub fn unsubscribe(self) {
    let Some(inner) = self.bus.upgrade() else {
      return;
    };
    if let Ok(mut subscribers) = inner.subscribers.lock() {
      subscribers.retain(|s| s.id != self.id);
    };
  }
}
