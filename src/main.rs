mod app;
mod cache;
mod config;
mod connectivity;
mod contacts;
mod error;
mod logging;
mod paging;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::app::{App, Command};
use crate::cache::{MemoryStorage, SqliteStorage};

#[derive(Parser, Debug)]
#[command(name = "lydia")]
#[command(about = "Offline-capable contact list synchronized from a paged API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/lydia/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init()?;

  let config = config::Config::load(args.config.as_deref())?;
  let cache_path = config.cache_path()?;
  let seed = config.seed(&cache_path);

  if config.cache.enabled {
    info!(path = %cache_path.display(), "using sqlite cache");
    let store = Arc::new(SqliteStorage::open(&cache_path, &config.page_source(&seed))?);
    App::new(config, store, seed)?.run(args.command).await
  } else {
    info!("cache disabled, keeping contacts in memory");
    let store = Arc::new(MemoryStorage::new());
    App::new(config, store, seed)?.run(args.command).await
  }
}
