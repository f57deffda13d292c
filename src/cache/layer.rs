//! Cache-strategy engine that sits between every request and the network.

use futures::future::try_join_all;
use reqwest::Method;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::{Origin, Url};

use super::key::request_key;
use super::storage::GenerationStorage;
use super::traits::{CacheResult, CachedResponse, Fetcher, Request, RequestMode, Response};
use crate::config::CacheConfig;
use crate::error::FetchError;

/// Lifecycle of the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
  /// Nothing installed yet
  Idle,
  /// Manifest fetch in progress
  Installing,
  /// Manifest stored, older generations not yet evicted
  Installed,
  /// Serving requests from the current generation
  Active,
  /// Install failed; the generation was never stored
  Redundant,
}

impl std::fmt::Display for EngineState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Idle => write!(f, "idle"),
      Self::Installing => write!(f, "installing"),
      Self::Installed => write!(f, "installed"),
      Self::Active => write!(f, "active"),
      Self::Redundant => write!(f, "redundant"),
    }
  }
}

/// Per-request strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Not intercepted; goes straight to the network
  Passthrough,
  /// Network, then cached match, then the offline shell
  NetworkFirst,
  /// Cached match, then network (stored on the way back)
  CacheFirst,
}

/// Engine that routes each request to network-first or cache-first handling
/// and manages the versioned cache generations.
///
/// Navigations always resolve to something renderable once the shell is
/// installed; other requests tolerate staleness but fail when offline and
/// never seen before.
pub struct CacheStrategyEngine<S: GenerationStorage, F: Fetcher> {
  storage: Arc<S>,
  network: Arc<F>,
  base: Url,
  origin: Origin,
  generation: String,
  shell: Url,
  manifest: Vec<String>,
  state: Arc<Mutex<EngineState>>,
}

impl<S: GenerationStorage, F: Fetcher> CacheStrategyEngine<S, F> {
  /// Create an engine for `config`'s generation, serving requests for `base`'s origin.
  pub fn new(storage: S, network: F, config: &CacheConfig, base: Url) -> Result<Self, FetchError> {
    let shell = resolve(&base, &config.shell)?;

    Ok(Self {
      storage: Arc::new(storage),
      network: Arc::new(network),
      origin: base.origin(),
      base,
      generation: config.generation_name(),
      shell,
      manifest: config.manifest.clone(),
      state: Arc::new(Mutex::new(EngineState::Idle)),
    })
  }

  /// Name of the current generation.
  pub fn generation(&self) -> &str {
    &self.generation
  }

  pub fn state(&self) -> EngineState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(EngineState::Redundant)
  }

  fn set_state(&self, state: EngineState) {
    if let Ok(mut current) = self.state.lock() {
      let previous = *current;
      debug!(from = %previous, to = %state, generation = %self.generation, "engine state change");
      *current = state;
    }
  }

  /// Resolve a path or absolute URL against the engine's origin.
  pub fn resolve(&self, path: &str) -> Result<Url, FetchError> {
    resolve(&self.base, path)
  }

  /// All generation names currently stored, oldest first.
  pub fn generation_names(&self) -> Result<Vec<String>, FetchError> {
    Ok(self.storage.generation_names()?)
  }

  /// Number of entries held by `generation`.
  pub fn entry_count(&self, generation: &str) -> Result<usize, FetchError> {
    Ok(self.storage.entry_count(generation)?)
  }

  /// Pick up an installation from an earlier run.
  pub fn restore(&self) -> Result<EngineState, FetchError> {
    let state = self.stored_state()?;
    self.set_state(state);
    Ok(state)
  }

  /// State implied by what is in storage.
  fn stored_state(&self) -> Result<EngineState, FetchError> {
    let names = self.storage.generation_names()?;
    Ok(if !names.iter().any(|n| *n == self.generation) {
      EngineState::Idle
    } else if names.len() > 1 {
      EngineState::Installed
    } else {
      EngineState::Active
    })
  }

  /// Fetch the whole manifest and store it as the current generation.
  ///
  /// All-or-nothing: one failed or non-2xx fetch fails the install and nothing
  /// is stored. An active engine keeps serving throughout; a successful
  /// re-install refreshes the current generation in place.
  pub async fn install(&self) -> Result<usize, FetchError> {
    let previous = self.state();
    if previous != EngineState::Active {
      self.set_state(EngineState::Installing);
    }

    match self.populate().await {
      Ok(count) => {
        if previous != EngineState::Active {
          self.set_state(EngineState::Installed);
        }
        info!(generation = %self.generation, entries = count, "cache generation installed");
        Ok(count)
      }
      Err(e) => {
        // An earlier install of this generation stays usable
        let state = match self.stored_state() {
          Ok(EngineState::Idle) | Err(_) => EngineState::Redundant,
          Ok(stored) => stored,
        };
        self.set_state(state);
        warn!(generation = %self.generation, error = %e, %state, "cache install failed");
        Err(e)
      }
    }
  }

  async fn populate(&self) -> Result<usize, FetchError> {
    let requests = self
      .manifest
      .iter()
      .map(|path| self.resolve(path).map(Request::get))
      .collect::<Result<Vec<_>, _>>()?;

    let fetches = requests.iter().map(|request| async move {
      let url = request.url.to_string();
      let response = match self.network.fetch(request).await {
        Ok(response) => response,
        Err(e) => {
          return Err(FetchError::Install {
            url,
            reason: e.to_string(),
          })
        }
      };

      if !response.is_success() {
        return Err(FetchError::Install {
          url,
          reason: format!("HTTP {}", response.status),
        });
      }
      Ok::<_, FetchError>((request_key(&request.url), response))
    });

    let entries = try_join_all(fetches).await?;
    self.storage.put_all(&self.generation, &entries)?;
    Ok(entries.len())
  }

  /// Make the installed generation current, deleting every other one.
  /// Returns the deleted generation names.
  pub fn activate(&self) -> Result<Vec<String>, FetchError> {
    let names = self.storage.generation_names()?;
    if !names.iter().any(|n| *n == self.generation) {
      return Err(FetchError::NotInstalled(self.generation.clone()));
    }

    let mut deleted = Vec::new();
    for name in names.into_iter().filter(|n| *n != self.generation) {
      self.storage.delete_generation(&name)?;
      deleted.push(name);
    }

    self.set_state(EngineState::Active);
    info!(generation = %self.generation, evicted = deleted.len(), "cache generation activated");
    Ok(deleted)
  }

  /// Decide how `request` is handled.
  pub fn route(&self, request: &Request) -> Route {
    if self.state() != EngineState::Active
      || request.method != Method::GET
      || request.url.origin() != self.origin
    {
      return Route::Passthrough;
    }

    match request.mode {
      RequestMode::Navigate => Route::NetworkFirst,
      RequestMode::Subresource => Route::CacheFirst,
    }
  }

  /// Serve `request` according to its route.
  pub async fn fetch(&self, request: &Request) -> Result<CacheResult, FetchError> {
    match self.route(request) {
      Route::Passthrough => {
        let response = self.network.fetch(request).await?;
        Ok(CacheResult::from_network(response))
      }
      Route::NetworkFirst => self.network_first(request).await,
      Route::CacheFirst => self.cache_first(request).await,
    }
  }

  async fn network_first(&self, request: &Request) -> Result<CacheResult, FetchError> {
    match self.network.fetch(request).await {
      Ok(response) => {
        self.store_copy(&request.url, &response);
        Ok(CacheResult::from_network(response))
      }
      Err(e) => {
        if let Some(cached) = self.lookup(&request.url) {
          debug!(url = %request.url, generation = %cached.generation, "network failed, serving cached navigation");
          return Ok(CacheResult::from_cache(cached));
        }
        if let Some(shell) = self.lookup(&self.shell) {
          info!(url = %request.url, generation = %shell.generation, "network failed, serving offline shell");
          return Ok(CacheResult::offline_shell(shell));
        }
        Err(e)
      }
    }
  }

  async fn cache_first(&self, request: &Request) -> Result<CacheResult, FetchError> {
    if let Some(cached) = self.lookup(&request.url) {
      return Ok(CacheResult::from_cache(cached));
    }

    let response = self.network.fetch(request).await?;
    self.store_copy(&request.url, &response);
    Ok(CacheResult::from_network(response))
  }

  /// Storage faults while serving are logged and treated as a miss.
  fn lookup(&self, url: &Url) -> Option<CachedResponse> {
    match self.storage.lookup(&request_key(url), &self.generation) {
      Ok(found) => found,
      Err(e) => {
        warn!(%url, error = %e, "cache lookup failed");
        None
      }
    }
  }

  /// Opportunistically refresh the current generation. Only 2xx responses
  /// are kept.
  fn store_copy(&self, url: &Url, response: &Response) {
    if !response.is_success() {
      return;
    }
    if let Err(e) = self
      .storage
      .put(&self.generation, &request_key(url), response)
    {
      warn!(%url, error = %e, "failed to store response in cache");
    }
  }
}

fn resolve(base: &Url, path: &str) -> Result<Url, FetchError> {
  base
    .join(path)
    .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", path, e)))
}

impl<S: GenerationStorage, F: Fetcher> Clone for CacheStrategyEngine<S, F> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      network: Arc::clone(&self.network),
      base: self.base.clone(),
      origin: self.origin.clone(),
      generation: self.generation.clone(),
      shell: self.shell.clone(),
      manifest: self.manifest.clone(),
      state: Arc::clone(&self.state),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteGenerationStorage;
  use crate::cache::traits::CacheSource;
  use crate::db::Database;
  use futures::future::BoxFuture;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

  const BASE: &str = "http://localhost:5100";

  #[derive(Default)]
  struct FakeNetwork {
    pages: Mutex<HashMap<String, (u16, String)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
  }

  impl FakeNetwork {
    fn serve(&self, path: &str, status: u16, body: &str) {
      let url = format!("{}{}", BASE, path);
      self
        .pages
        .lock()
        .unwrap()
        .insert(url, (status, body.to_string()));
    }
  }

  impl Fetcher for Arc<FakeNetwork> {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
      Box::pin(async move {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = request.url.to_string();
        if self.offline.load(Ordering::SeqCst) {
          return Err(FetchError::Network {
            url,
            reason: "offline".into(),
          });
        }
        let (status, body) = self
          .pages
          .lock()
          .unwrap()
          .get(&url)
          .cloned()
          .unwrap_or((404, "not found".into()));
        Ok(Response {
          url,
          status,
          content_type: Some("text/html".into()),
          body: body.into_bytes(),
        })
      })
    }
  }

  type Engine = CacheStrategyEngine<SqliteGenerationStorage, Arc<FakeNetwork>>;

  fn config(version: u32) -> CacheConfig {
    CacheConfig {
      version,
      manifest: vec!["/".into(), "/library.html".into(), "/static/data/drills.json".into()],
      ..Default::default()
    }
  }

  fn engine_with(db: &Database, network: &Arc<FakeNetwork>, version: u32) -> Engine {
    CacheStrategyEngine::new(
      SqliteGenerationStorage::new(db.clone()),
      network.clone(),
      &config(version),
      Url::parse(BASE).unwrap(),
    )
    .unwrap()
  }

  fn setup() -> (Engine, Arc<FakeNetwork>, Database) {
    let db = Database::open_in_memory().unwrap();
    let network = Arc::new(FakeNetwork::default());
    network.serve("/", 200, "<html>shell</html>");
    network.serve("/library.html", 200, "library");
    network.serve("/static/data/drills.json", 200, r#"{"drills":[]}"#);
    let engine = engine_with(&db, &network, 2);
    (engine, network, db)
  }

  async fn active() -> (Engine, Arc<FakeNetwork>, Database) {
    let (engine, network, db) = setup();
    engine.install().await.unwrap();
    engine.activate().unwrap();
    (engine, network, db)
  }

  fn url(path: &str) -> Url {
    Url::parse(BASE).unwrap().join(path).unwrap()
  }

  #[tokio::test]
  async fn test_install_stores_manifest() {
    let (engine, _, _) = setup();
    assert_eq!(engine.state(), EngineState::Idle);

    let count = engine.install().await.unwrap();

    assert_eq!(count, 3);
    assert_eq!(engine.state(), EngineState::Installed);
    assert_eq!(
      engine.generation_names().unwrap(),
      vec!["hooptutor-cache-v2".to_string()]
    );
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let (engine, network, _) = setup();
    network.serve("/library.html", 500, "boom");

    let result = engine.install().await;

    assert!(matches!(result, Err(FetchError::Install { .. })));
    assert_eq!(engine.state(), EngineState::Redundant);
    assert!(engine.generation_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_install_fails_offline() {
    let (engine, network, _) = setup();
    network.offline.store(true, Ordering::SeqCst);

    assert!(engine.install().await.is_err());
    assert!(engine.generation_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_activate_requires_install() {
    let (engine, _, _) = setup();
    assert!(matches!(engine.activate(), Err(FetchError::NotInstalled(_))));
  }

  #[tokio::test]
  async fn test_activation_evicts_previous_generations() {
    let db = Database::open_in_memory().unwrap();
    let network = Arc::new(FakeNetwork::default());
    network.serve("/", 200, "v1 shell");
    network.serve("/library.html", 200, "library");
    network.serve("/static/data/drills.json", 200, "{}");

    let old = engine_with(&db, &network, 1);
    old.install().await.unwrap();
    old.activate().unwrap();

    network.serve("/", 200, "v2 shell");
    let new = engine_with(&db, &network, 2);
    new.install().await.unwrap();
    assert_eq!(new.generation_names().unwrap().len(), 2);

    let evicted = new.activate().unwrap();

    assert_eq!(evicted, vec!["hooptutor-cache-v1".to_string()]);
    assert_eq!(
      new.generation_names().unwrap(),
      vec!["hooptutor-cache-v2".to_string()]
    );
    let storage = SqliteGenerationStorage::new(db.clone());
    assert_eq!(storage.entry_count("hooptutor-cache-v1").unwrap(), 0);
  }

  #[tokio::test]
  async fn test_everything_passes_through_before_activation() {
    let (engine, _, _) = setup();
    engine.install().await.unwrap();
    assert_eq!(engine.route(&Request::navigate(url("/"))), Route::Passthrough);
  }

  #[tokio::test]
  async fn test_routing() {
    let (engine, _, _) = active().await;

    assert_eq!(engine.route(&Request::navigate(url("/defense.html"))), Route::NetworkFirst);
    assert_eq!(engine.route(&Request::get(url("/static/js/app.js"))), Route::CacheFirst);
    assert_eq!(
      engine.route(&Request::get(url("/static/data/drills.json"))),
      Route::CacheFirst
    );
    assert_eq!(
      engine.route(&Request::get(url("/api/favorites")).with_method(Method::PUT)),
      Route::Passthrough
    );
    let foreign = Url::parse("https://cdn.example.com/lib.js").unwrap();
    assert_eq!(engine.route(&Request::get(foreign)), Route::Passthrough);
  }

  #[tokio::test]
  async fn test_navigation_offline_without_match_serves_shell() {
    let (engine, network, _) = active().await;
    network.offline.store(true, Ordering::SeqCst);

    let result = engine
      .fetch(&Request::navigate(url("/never-visited.html")))
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::OfflineShell);
    assert_eq!(result.response.body, b"<html>shell</html>");
  }

  #[tokio::test]
  async fn test_navigation_prefers_network_and_refreshes_cache() {
    let (engine, network, _) = active().await;
    network.serve("/library.html", 200, "library v2");

    let online = engine.fetch(&Request::navigate(url("/library.html"))).await.unwrap();
    assert_eq!(online.source, CacheSource::Network);

    network.offline.store(true, Ordering::SeqCst);
    let offline = engine.fetch(&Request::navigate(url("/library.html"))).await.unwrap();

    assert_eq!(offline.source, CacheSource::Cache);
    assert_eq!(offline.response.body, b"library v2");
  }

  #[tokio::test]
  async fn test_navigation_error_status_is_returned_but_not_cached() {
    let (engine, network, _) = active().await;
    network.serve("/library.html", 503, "maintenance");

    let result = engine.fetch(&Request::navigate(url("/library.html"))).await.unwrap();
    assert_eq!(result.response.status, 503);

    network.offline.store(true, Ordering::SeqCst);
    let offline = engine.fetch(&Request::navigate(url("/library.html"))).await.unwrap();
    assert_eq!(offline.response.body, b"library");
  }

  #[tokio::test]
  async fn test_cache_first_hit_skips_network() {
    let (engine, network, _) = active().await;
    let before = network.calls.load(Ordering::SeqCst);

    let result = engine
      .fetch(&Request::get(url("/static/data/drills.json")))
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Cache);
    assert!(result.cached_at.is_some());
    assert_eq!(network.calls.load(Ordering::SeqCst), before);
  }

  #[tokio::test]
  async fn test_cache_first_miss_populates() {
    let (engine, network, _) = active().await;
    network.serve("/static/images/step-back.jpg", 200, "jpeg");

    let first = engine
      .fetch(&Request::get(url("/static/images/step-back.jpg")))
      .await
      .unwrap();
    network.offline.store(true, Ordering::SeqCst);
    let second = engine
      .fetch(&Request::get(url("/static/images/step-back.jpg")))
      .await
      .unwrap();

    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.response.body, b"jpeg");
  }

  #[tokio::test]
  async fn test_cache_first_miss_offline_propagates() {
    let (engine, network, _) = active().await;
    network.offline.store(true, Ordering::SeqCst);

    let result = engine.fetch(&Request::get(url("/static/images/unknown.jpg"))).await;

    assert!(matches!(result, Err(FetchError::Network { .. })));
  }

  #[tokio::test]
  async fn test_failed_reinstall_keeps_serving() {
    let (engine, network, _) = active().await;
    network.offline.store(true, Ordering::SeqCst);

    assert!(engine.install().await.is_err());

    assert_eq!(engine.state(), EngineState::Active);
    assert_eq!(
      engine.generation_names().unwrap(),
      vec!["hooptutor-cache-v2".to_string()]
    );
    let result = engine.fetch(&Request::navigate(url("/x.html"))).await.unwrap();
    assert_eq!(result.source, CacheSource::OfflineShell);
  }

  #[tokio::test]
  async fn test_reinstall_refreshes_active_generation() {
    let (engine, network, _) = active().await;
    network.serve("/library.html", 200, "library v3");

    engine.install().await.unwrap();

    assert_eq!(engine.state(), EngineState::Active);
    network.offline.store(true, Ordering::SeqCst);
    let result = engine.fetch(&Request::navigate(url("/library.html"))).await.unwrap();
    assert_eq!(result.response.body, b"library v3");
  }

  #[tokio::test]
  async fn test_failed_install_falls_back_to_stored_generation() {
    let (engine, network, _) = setup();
    engine.install().await.unwrap();
    network.offline.store(true, Ordering::SeqCst);

    assert!(engine.install().await.is_err());
    assert_eq!(engine.state(), EngineState::Active);
    assert!(engine.activate().is_ok());
  }

  #[tokio::test]
  async fn test_navigation_offline_without_shell_returns_network_error() {
    let db = Database::open_in_memory().unwrap();
    let network = Arc::new(FakeNetwork::default());
    network.serve("/library.html", 200, "library");
    let config = CacheConfig {
      manifest: vec!["/library.html".into()],
      ..Default::default()
    };
    let engine = CacheStrategyEngine::new(
      SqliteGenerationStorage::new(db),
      network.clone(),
      &config,
      Url::parse(BASE).unwrap(),
    )
    .unwrap();
    engine.install().await.unwrap();
    engine.activate().unwrap();
    network.offline.store(true, Ordering::SeqCst);

    let result = engine.fetch(&Request::navigate(url("/never-visited.html"))).await;

    assert!(matches!(result, Err(FetchError::Network { .. })));
  }

  #[tokio::test]
  async fn test_restore_after_restart() {
    let (engine, network, db) = active().await;
    drop(engine);

    let restarted = engine_with(&db, &network, 2);
    assert_eq!(restarted.restore().unwrap(), EngineState::Active);

    let upgraded = engine_with(&db, &network, 3);
    assert_eq!(upgraded.restore().unwrap(), EngineState::Idle);
  }
}
