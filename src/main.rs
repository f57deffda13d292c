mod app;
mod bus;
mod cache;
mod catalog;
mod commands;
mod config;
mod db;
mod error;
mod favorites;
mod logging;
mod profile;
mod remote;
mod session;
mod store;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hooptutor")]
#[command(about = "Offline-first favourites, profile and asset cache for HoopTutor")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/hooptutor/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  /// Keep all state in memory for this run
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if args.ephemeral {
    config.storage.ephemeral = true;
  }

  let _guard = logging::init(&config, args.verbose)?;

  let app = app::App::new(config)?;
  app.run(args.command).await?;
  app.close();

  Ok(())
}
