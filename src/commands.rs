//! Subcommands of the `hooptutor` binary.

use clap::{Args, Subcommand};

use crate::profile::ProfileInput;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Pull profile and favourites from the server
  Sync,
  /// End the session and clear local profile and favourites
  Logout,
  /// Manage favourite drills
  #[command(subcommand, visible_alias = "fav")]
  Favorites(FavoritesCommand),
  /// Show or edit the local profile
  #[command(subcommand)]
  Profile(ProfileCommand),
  /// Print the drill catalogue (served from the snapshot when offline)
  Catalog,
  /// Manage the offline response cache
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum FavoritesCommand {
  /// List favourite drill ids
  #[command(visible_alias = "ls")]
  List,
  /// Add or remove one drill
  Toggle { id: String },
  /// Replace the whole set
  Set {
    ids: Vec<String>,
    /// Do not push the new set to the server
    #[arg(long)]
    local: bool,
  },
  /// Remove every favourite
  Clear {
    /// Do not push the empty set to the server
    #[arg(long)]
    local: bool,
  },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ProfileCommand {
  /// Print the current profile as JSON
  Show,
  /// Replace the profile with the given fields
  Set(ProfileArgs),
  /// Forget the profile and become a guest
  Clear,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileArgs {
  #[arg(long)]
  pub id: Option<String>,
  #[arg(long)]
  pub name: Option<String>,
  #[arg(long)]
  pub email: Option<String>,
  #[arg(long)]
  pub avatar: Option<String>,
  #[arg(long)]
  pub skill_level: Option<String>,
  #[arg(long)]
  pub date_of_birth: Option<String>,
  #[arg(long)]
  pub gender: Option<String>,
  #[arg(long)]
  pub position: Option<String>,
}

impl From<ProfileArgs> for ProfileInput {
  fn from(args: ProfileArgs) -> Self {
    ProfileInput {
      id: args.id,
      name: args.name,
      email: args.email,
      avatar: args.avatar,
      skill_level: args.skill_level,
      date_of_birth: args.date_of_birth,
      gender: args.gender,
      position: args.position,
    }
  }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheCommand {
  /// Fetch the manifest into the current generation
  Install,
  /// Make the current generation active and evict the others
  Activate,
  /// List stored generations
  List,
  /// Request a path through the cache
  Get {
    path: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
    /// Write the response body to stdout
    #[arg(long)]
    body: bool,
  },
}
