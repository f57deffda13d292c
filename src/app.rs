use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::bus::{ChangeBus, Subscription};
use crate::cache::{CacheStrategyEngine, HttpFetcher, Request, SqliteGenerationStorage};
use crate::catalog::CatalogService;
use crate::commands::{CacheCommand, Command, FavoritesCommand, ProfileCommand};
use crate::config::Config;
use crate::db::Database;
use crate::favorites::{FavoritesStore, SyncMode};
use crate::profile::ProfileStore;
use crate::remote::{HttpRemote, RemoteApi};
use crate::session::{Reconciliation, SessionReconciler};
use crate::store::{DurableStore, MemoryBackend, SqliteBackend};

/// Application context. Every component is built once here and shared by
/// handle; nothing lives in a global.
pub struct App {
  favorites: FavoritesStore,
  profile: ProfileStore,
  session: SessionReconciler,
  catalog: CatalogService,
  engine: CacheStrategyEngine<SqliteGenerationStorage, HttpFetcher>,

  /// Change log subscriptions
  subscriptions: Vec<Subscription>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let db = if config.storage.ephemeral {
      Database::open_in_memory()?
    } else {
      Database::open(&config.storage.database_path()?)?
    };

    let store = if config.storage.ephemeral {
      DurableStore::new(MemoryBackend::new())
    } else {
      DurableStore::new(SqliteBackend::new(db.clone()))
    };
    let bus = ChangeBus::new();
    let favorites = FavoritesStore::new(store.clone(), bus.clone());
    let profile = ProfileStore::new(store.clone(), bus);

    let cookie = Config::get_session_cookie();
    let remote: Arc<dyn RemoteApi> = Arc::new(HttpRemote::new(&config.server, cookie.clone())?);
    let session = SessionReconciler::new(Arc::clone(&remote), favorites.clone(), profile.clone());
    session.install_sync_delegate();
    let catalog = CatalogService::new(remote, store);

    let base = Url::parse(&config.server.url)
      .map_err(|e| eyre!("Invalid server url {}: {}", config.server.url, e))?;
    let fetcher = HttpFetcher::new(
      Duration::from_secs(config.server.timeout_secs),
      cookie.as_deref(),
    )?;
    let engine = CacheStrategyEngine::new(
      SqliteGenerationStorage::new(db),
      fetcher,
      &config.cache,
      base,
    )?;
    let state = engine.restore()?;
    debug!(generation = engine.generation(), %state, "cache engine restored");

    let subscriptions = vec![
      favorites.subscribe(|set| debug!(count = set.len(), "favourites changed")),
      profile.subscribe(|p| debug!(authenticated = p.authenticated, "profile changed")),
    ];

    Ok(Self {
      favorites,
      profile,
      session,
      catalog,
      engine,
      subscriptions,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Sync => self.sync().await?,
      Command::Logout => {
        if let Err(e) = self.session.logout().await {
          eprintln!("Server logout failed ({}); local session cleared", e);
        } else {
          println!("Logged out");
        }
      }
      Command::Favorites(cmd) => self.favorites_command(cmd),
      Command::Profile(cmd) => self.profile_command(cmd)?,
      Command::Catalog => {
        let catalog = self.catalog.fetch_catalogue().await?;
        info!(source = ?catalog.source, "catalogue loaded");
        println!("{}", serde_json::to_string_pretty(&catalog.data)?);
      }
      Command::Cache(cmd) => self.cache_command(cmd).await?,
    }

    // Let pending favourite pushes finish before the runtime shuts down
    self.favorites.flush().await;
    Ok(())
  }

  /// Drop the change log subscriptions.
  pub fn close(self) {
    for subscription in self.subscriptions {
      subscription.unsubscribe();
    }
  }

  async fn sync(&self) -> Result<()> {
    match self.session.reconcile().await {
      Reconciliation::Applied { profile, favorites } => {
        println!(
          "Synced: profile {}, {} favourites",
          if profile { "updated" } else { "unchanged" },
          favorites.map_or_else(|| "unchanged".to_string(), |n| n.to_string()),
        );
      }
      Reconciliation::Cleared => println!("Not signed in; local profile and favourites cleared"),
      Reconciliation::Unauthorized => {
        return Err(eyre!("Session rejected by server; sign in again and set HOOPTUTOR_SESSION"));
      }
      Reconciliation::Failed(reason) => {
        warn!(%reason, "sync failed");
        eprintln!("Server unreachable ({}); keeping local data", reason);
      }
      Reconciliation::Stale => println!("Session ended during sync"),
    }
    Ok(())
  }

  fn favorites_command(&self, cmd: FavoritesCommand) {
    match cmd {
      FavoritesCommand::List => {
        for id in self.favorites.get_favorites().iter() {
          println!("{}", id);
        }
      }
      FavoritesCommand::Toggle { id } => {
        let toggle = self.favorites.toggle_favorite(&id);
        println!(
          "{} {} ({} favourites)",
          if toggle.active { "Added" } else { "Removed" },
          id,
          toggle.favorites.len()
        );
      }
      FavoritesCommand::Set { ids, local } => {
        let set = self.favorites.set_favorites(ids, sync_mode(local));
        println!("{} favourites", set.len());
      }
      FavoritesCommand::Clear { local } => {
        self.favorites.clear_favorites(sync_mode(local));
        println!("Favourites cleared");
      }
    }
  }

  fn profile_command(&self, cmd: ProfileCommand) -> Result<()> {
    let profile = match cmd {
      ProfileCommand::Show => self.profile.get_profile(),
      ProfileCommand::Set(args) => self.profile.set_profile(args.into()),
      ProfileCommand::Clear => self.profile.clear_profile(),
    };
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
  }

  async fn cache_command(&self, cmd: CacheCommand) -> Result<()> {
    match cmd {
      CacheCommand::Install => {
        let count = self.engine.install().await?;
        println!("Installed {} entries into {}", count, self.engine.generation());
      }
      CacheCommand::Activate => {
        let evicted = self.engine.activate()?;
        println!("Activated {}", self.engine.generation());
        for name in evicted {
          println!("Evicted {}", name);
        }
      }
      CacheCommand::List => {
        println!("State: {}", self.engine.state());
        for name in self.engine.generation_names()? {
          let marker = if name == self.engine.generation() { "*" } else { " " };
          println!("{} {} ({} entries)", marker, name, self.engine.entry_count(&name)?);
        }
      }
      CacheCommand::Get {
        path,
        navigate,
        body,
      } => {
        let url = self.engine.resolve(&path)?;
        let request = if navigate {
          Request::navigate(url)
        } else {
          Request::get(url)
        };

        let result = self.engine.fetch(&request).await?;
        eprintln!(
          "{} {} from {} ({} bytes)",
          result.response.status,
          result.response.content_type.as_deref().unwrap_or("-"),
          result.source,
          result.response.body.len()
        );
        if let Some(cached_at) = result.cached_at {
          eprintln!("Cached at {}", cached_at.to_rfc3339());
        }
        if body {
          std::io::stdout().write_all(&result.response.body)?;
        }
      }
    }
    Ok(())
  }
}

fn sync_mode(local: bool) -> SyncMode {
  if local {
    SyncMode::LocalOnly
  } else {
    SyncMode::Push
  }
}
