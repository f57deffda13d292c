//! Startup reconciliation between local state and the server.
//!
//! The server is authoritative for profile and favourites, but a failed
//! reconciliation must never destroy local data: only a definite answer from
//! the server changes local state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::favorites::{FavoritesStore, SyncMode};
use crate::profile::ProfileStore;
use crate::remote::RemoteApi;

/// Outcome of [`SessionReconciler::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
  /// Authenticated session; server values written where present.
  Applied {
    profile: bool,
    favorites: Option<usize>,
  },
  /// The server reports no session; local state cleared.
  Cleared,
  /// The server rejected our credentials. Local state kept.
  Unauthorized,
  /// The server could not be reached or answered garbage. Local state kept.
  Failed(String),
  /// A logout happened while the request was in flight; the answer was dropped.
  Stale,
}

/// Pulls server truth into the local stores and owns the session lifecycle.
#[derive(Clone)]
pub struct SessionReconciler {
  remote: Arc<dyn RemoteApi>,
  favorites: FavoritesStore,
  profile: ProfileStore,
  /// Bumped on logout; in-flight work from an older epoch is discarded.
  epoch: Arc<AtomicU64>,
}

impl SessionReconciler {
  pub fn new(remote: Arc<dyn RemoteApi>, favorites: FavoritesStore, profile: ProfileStore) -> Self {
    Self {
      remote,
      favorites,
      profile,
      epoch: Arc::new(AtomicU64::new(0)),
    }
  }

  /// Fetch the session and merge it into the stores.
  pub async fn reconcile(&self) -> Reconciliation {
    let epoch = self.epoch.load(Ordering::SeqCst);
    let result = self.remote.fetch_session().await;

    if self.epoch.load(Ordering::SeqCst) != epoch {
      info!("session ended during reconciliation, ignoring server answer");
      return Reconciliation::Stale;
    }

    match result {
      Ok(session) if session.authenticated => {
        let profile = match session.profile {
          Some(input) => {
            self.profile.set_profile(input);
            true
          }
          None => false,
        };
        // Server-sourced, so never pushed straight back
        let favorites = session
          .favorites
          .map(|ids| self.favorites.set_favorites(ids, SyncMode::LocalOnly).len());

        info!(profile, favorites, "applied server session");
        Reconciliation::Applied { profile, favorites }
      }
      Ok(_) => {
        self.clear_local();
        info!("no server session, cleared local profile and favourites");
        Reconciliation::Cleared
      }
      Err(e) if e.is_unauthorized() => {
        warn!("session request rejected, keeping local state");
        Reconciliation::Unauthorized
      }
      Err(e) => {
        warn!(error = %e, "session reconciliation failed, keeping local state");
        Reconciliation::Failed(e.to_string())
      }
    }
  }

  /// Route pushed favourites to the server while the profile is authenticated.
  pub fn install_sync_delegate(&self) {
    let remote = Arc::clone(&self.remote);
    let profile = self.profile.clone();

    self
      .favorites
      .register_remote_sync_delegate(move |favorites: Vec<String>| {
        let remote = Arc::clone(&remote);
        let authenticated = profile.get_profile().authenticated;
        async move {
          if !authenticated {
            debug!("guest session, favourites kept local");
            return Ok(());
          }
          remote.push_favorites(favorites).await
        }
      });
  }

  /// End the session. Local state is cleared whatever the server says; the
  /// remote result is returned for reporting only.
  pub async fn logout(&self) -> Result<(), RemoteError> {
    self.epoch.fetch_add(1, Ordering::SeqCst);
    let remote = self.remote.logout().await;
    if let Err(e) = &remote {
      warn!(error = %e, "remote logout failed, clearing local state anyway");
    }

    self.clear_local();
    remote
  }

  fn clear_local(&self) {
    self.profile.clear_profile();
    self.favorites.clear_favorites(SyncMode::LocalOnly);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bus::ChangeBus;
  use crate::profile::{Profile, ProfileInput};
  use crate::remote::fake::FakeRemote;
  use crate::remote::Session;
  use crate::store::{DurableStore, MemoryBackend};
  use tokio::sync::Notify;

  struct Harness {
    remote: Arc<FakeRemote>,
    favorites: FavoritesStore,
    profile: ProfileStore,
    reconciler: SessionReconciler,
  }

  fn harness(remote: FakeRemote) -> Harness {
    let store = DurableStore::new(MemoryBackend::new());
    let bus = ChangeBus::new();
    let favorites = FavoritesStore::new(store.clone(), bus.clone());
    let profile = ProfileStore::new(store, bus);
    let remote = Arc::new(remote);
    let reconciler = SessionReconciler::new(remote.clone(), favorites.clone(), profile.clone());
    reconciler.install_sync_delegate();

    Harness {
      remote,
      favorites,
      profile,
      reconciler,
    }
  }

  fn seed_local(h: &Harness) {
    h.profile.set_profile(ProfileInput {
      id: Some("local".into()),
      name: Some("Local".into()),
      ..Default::default()
    });
    h.favorites.set_favorites(["d9"], SyncMode::LocalOnly);
  }

  fn ann_session() -> Session {
    Session {
      authenticated: true,
      profile: Some(ProfileInput {
        id: Some("u1".into()),
        name: Some("Ann".into()),
        ..Default::default()
      }),
      favorites: Some(vec!["d1".into(), "d2".into()]),
    }
  }

  #[tokio::test]
  async fn test_network_failure_keeps_local_state() {
    let h = harness(FakeRemote::with_session(Err(RemoteError::Network(
      "offline".into(),
    ))));
    seed_local(&h);
    let (profile, favorites) = (h.profile.get_profile(), h.favorites.get_favorites());

    let outcome = h.reconciler.reconcile().await;

    assert!(matches!(outcome, Reconciliation::Failed(_)));
    assert_eq!(h.profile.get_profile(), profile);
    assert_eq!(h.favorites.get_favorites(), favorites);
  }

  #[tokio::test]
  async fn test_malformed_response_keeps_local_state() {
    let h = harness(FakeRemote::with_session(Err(RemoteError::Decode(
      "expected object".into(),
    ))));
    seed_local(&h);

    h.reconciler.reconcile().await;

    assert_eq!(h.profile.get_profile().id.as_deref(), Some("local"));
    assert_eq!(h.favorites.get_favorites().to_vec(), vec!["d9"]);
  }

  #[tokio::test]
  async fn test_authenticated_session_is_applied_without_push() {
    let h = harness(FakeRemote::with_session(Ok(ann_session())));
    seed_local(&h);

    let outcome = h.reconciler.reconcile().await;
    h.favorites.flush().await;

    assert_eq!(
      outcome,
      Reconciliation::Applied {
        profile: true,
        favorites: Some(2)
      }
    );
    let profile = h.profile.get_profile();
    assert_eq!(profile.id.as_deref(), Some("u1"));
    assert_eq!(profile.name.as_deref(), Some("Ann"));
    assert_eq!(h.favorites.get_favorites().to_vec(), vec!["d1", "d2"]);
    assert_eq!(h.remote.push_count(), 0);
  }

  #[tokio::test]
  async fn test_authenticated_session_without_favorites_keeps_them() {
    let session = Session {
      favorites: None,
      ..ann_session()
    };
    let h = harness(FakeRemote::with_session(Ok(session)));
    seed_local(&h);

    let outcome = h.reconciler.reconcile().await;

    assert_eq!(
      outcome,
      Reconciliation::Applied {
        profile: true,
        favorites: None
      }
    );
    assert_eq!(h.favorites.get_favorites().to_vec(), vec!["d9"]);
  }

  #[tokio::test]
  async fn test_unauthenticated_session_clears_locally() {
    let h = harness(FakeRemote::with_session(Ok(Session::default())));
    seed_local(&h);

    let outcome = h.reconciler.reconcile().await;
    h.favorites.flush().await;

    assert_eq!(outcome, Reconciliation::Cleared);
    assert_eq!(h.profile.get_profile(), Profile::guest());
    assert!(h.favorites.get_favorites().is_empty());
    assert_eq!(h.remote.push_count(), 0);
  }

  #[tokio::test]
  async fn test_unauthorized_is_distinct_and_keeps_state() {
    let h = harness(FakeRemote::with_session(Err(RemoteError::Unauthorized)));
    seed_local(&h);

    let outcome = h.reconciler.reconcile().await;

    assert_eq!(outcome, Reconciliation::Unauthorized);
    assert!(h.profile.get_profile().authenticated);
  }

  #[tokio::test]
  async fn test_logout_during_reconciliation_is_stale() {
    let gate = Arc::new(Notify::new());
    let remote = FakeRemote {
      session_gate: Some(gate.clone()),
      ..FakeRemote::with_session(Ok(ann_session()))
    };
    let h = harness(remote);

    let reconciler = h.reconciler.clone();
    let task = tokio::spawn(async move { reconciler.reconcile().await });
    tokio::task::yield_now().await;

    h.reconciler.logout().await.unwrap();
    gate.notify_one();

    assert_eq!(task.await.unwrap(), Reconciliation::Stale);
    assert!(!h.profile.get_profile().authenticated);
    assert!(h.favorites.get_favorites().is_empty());
  }

  #[tokio::test]
  async fn test_logout_clears_even_when_remote_fails() {
    let h = harness(FakeRemote::default());
    *h.remote.logout_reply.lock().unwrap() = Some(RemoteError::Network("offline".into()));
    seed_local(&h);

    let result = h.reconciler.logout().await;
    h.favorites.flush().await;

    assert!(result.is_err());
    assert_eq!(*h.remote.logouts.lock().unwrap(), 1);
    assert_eq!(h.profile.get_profile(), Profile::guest());
    assert!(h.favorites.get_favorites().is_empty());
    assert_eq!(h.remote.push_count(), 0);
  }

  #[tokio::test]
  async fn test_delegate_pushes_only_when_authenticated() {
    let h = harness(FakeRemote::default());

    h.favorites.toggle_favorite("d1");
    h.favorites.flush().await;
    assert_eq!(h.remote.push_count(), 0);

    seed_local(&h);
    h.favorites.toggle_favorite("d2");
    h.favorites.flush().await;

    assert_eq!(
      *h.remote.pushes.lock().unwrap(),
      vec![vec!["d9".to_string(), "d2".to_string()]]
    );
  }

  #[tokio::test]
  async fn test_push_failure_keeps_local_favorites() {
    let h = harness(FakeRemote::default());
    seed_local(&h);
    *h.remote.push_reply.lock().unwrap() = Some(RemoteError::Unauthorized);

    let toggle = h.favorites.toggle_favorite("d3");
    h.favorites.flush().await;

    assert!(toggle.active);
    assert_eq!(h.favorites.get_favorites().to_vec(), vec!["d9", "d3"]);
  }
}
