//! Scripted [`RemoteApi`] for tests.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{RemoteApi, Session};
use crate::error::RemoteError;

/// Answer for a scripted call.
pub type Reply<T> = Result<T, RemoteError>;

#[derive(Default)]
pub struct FakeRemote {
  pub sessions: Mutex<VecDeque<Reply<Session>>>,
  pub catalogues: Mutex<VecDeque<Reply<Value>>>,
  pub push_reply: Mutex<Option<RemoteError>>,
  pub logout_reply: Mutex<Option<RemoteError>>,
  pub pushes: Mutex<Vec<Vec<String>>>,
  pub logouts: Mutex<usize>,
  pub catalogue_calls: Mutex<usize>,
  /// When set, `fetch_session` waits for a notification before answering.
  pub session_gate: Option<Arc<Notify>>,
}

impl FakeRemote {
  pub fn with_session(reply: Reply<Session>) -> Self {
    let fake = Self::default();
    fake.sessions.lock().unwrap().push_back(reply);
    fake
  }

  pub fn with_catalogue(replies: Vec<Reply<Value>>) -> Self {
    let fake = Self::default();
    fake.catalogues.lock().unwrap().extend(replies);
    fake
  }

  pub fn push_count(&self) -> usize {
    self.pushes.lock().unwrap().len()
  }
}

fn offline<T>() -> Reply<T> {
  Err(RemoteError::Network("connection refused".into()))
}

impl RemoteApi for FakeRemote {
  fn fetch_session(&self) -> BoxFuture<'_, Result<Session, RemoteError>> {
    Box::pin(async move {
      if let Some(gate) = &self.session_gate {
        gate.notified().await;
      }
      self.sessions.lock().unwrap().pop_front().unwrap_or_else(offline)
    })
  }

  fn push_favorites(&self, favorites: Vec<String>) -> BoxFuture<'_, Result<(), RemoteError>> {
    Box::pin(async move {
      self.pushes.lock().unwrap().push(favorites);
      match self.push_reply.lock().unwrap().take() {
        Some(e) => Err(e),
        None => Ok(()),
      }
    })
  }

  fn fetch_catalogue(&self) -> BoxFuture<'_, Result<Value, RemoteError>> {
    Box::pin(async move {
      *self.catalogue_calls.lock().unwrap() += 1;
      self.catalogues.lock().unwrap().pop_front().unwrap_or_else(offline)
    })
  }

  fn logout(&self) -> BoxFuture<'_, Result<(), RemoteError>> {
    Box::pin(async move {
      *self.logouts.lock().unwrap() += 1;
      match self.logout_reply.lock().unwrap().take() {
        Some(e) => Err(e),
        None => Ok(()),
      }
    })
  }
}
