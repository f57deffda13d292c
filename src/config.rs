use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  /// Base URL of the HoopTutor server
  pub url: String,
  pub session_path: String,
  pub favorites_path: String,
  pub catalog_path: String,
  pub logout_path: String,
  /// Per-request timeout in seconds
  pub timeout_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:5100".to_string(),
      session_path: "/api/session".to_string(),
      favorites_path: "/api/favorites".to_string(),
      catalog_path: "/static/data/drills.json".to_string(),
      logout_path: "/api/logout".to_string(),
      timeout_secs: 10,
    }
  }
}

/// Offline asset manifest fetched at install time.
const DEFAULT_MANIFEST: &[&str] = &[
  "/",
  "/shooting.html",
  "/ball-handling.html",
  "/defense.html",
  "/fitness.html",
  "/library.html",
  "/login",
  "/profile",
  "/about.html",
  "/static/css/style.css",
  "/static/js/app.js",
  "/static/js/state.js",
  "/static/js/drill-library.js",
  "/static/data/drills.json",
  "/static/images/hero-basketball-court.jpg",
  "/static/images/shooting-drill.jpg",
  "/static/images/ball-handling-drill.jpg",
  "/static/images/defense-drill.jpg",
  "/static/images/fitness-drill.jpg",
  "/static/images/about_background.jpg",
  "/static/images/jordan_varsity_guard.jpg",
  "/static/images/user.jpg",
  "/static/images/wall-shooting.jpg",
  "/static/images/one-hand-shooting.jpg",
  "/static/images/elbow-shooting.jpg",
  "/static/images/catch-shoot.jpg",
  "/static/images/step-back.jpg",
  "/static/images/figure-8-dribble.jpg",
  "/static/images/cone-crossover.jpg",
  "/static/images/spider-dribble.jpg",
  "/static/images/two-ball-dribble.jpg",
  "/static/images/z-pattern-dribble.jpg",
  "/static/images/closeout-drill.jpg",
  "/static/images/mirror-drill.jpg",
  "/static/images/shell-drill.jpg",
  "/static/images/transition-recovery.jpg",
  "/static/images/avatar1.png",
  "/static/images/logo-placeholder.png",
  "/static/images/favicon.png",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Generation name prefix; the version is appended
  pub name: String,
  /// Bump to roll out a new generation and evict the old ones
  pub version: u32,
  /// Offline shell served for navigations with nothing cached
  pub shell: String,
  /// Paths fetched into the generation at install time
  pub manifest: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      name: "hooptutor-cache".to_string(),
      version: 2,
      shell: "/".to_string(),
      manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
    }
  }
}

impl CacheConfig {
  /// Name of the current cache generation, e.g. `hooptutor-cache-v2`.
  pub fn generation_name(&self) -> String {
    format!("{}-v{}", self.name, self.version)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Override for the data directory (default: $XDG_DATA_HOME/hooptutor)
  pub data_dir: Option<PathBuf>,
  /// Keep all state in memory for this run
  pub ephemeral: bool,
}

impl StorageConfig {
  /// Resolve the data directory holding the database and logs.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("hooptutor"))
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("state.db"))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter when RUST_LOG is unset
  pub level: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hooptutor.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hooptutor/config.yaml
  ///
  /// Without any file the built-in defaults are used; everything has a
  /// sensible default and the app must work offline anyway.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("hooptutor.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hooptutor").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the server session cookie from the environment.
  ///
  /// Checks HOOPTUTOR_SESSION. Without it every remote call is made as a guest.
  pub fn get_session_cookie() -> Option<String> {
    std::env::var("HOOPTUTOR_SESSION")
      .ok()
      .filter(|c| !c.trim().is_empty())
  }
}
