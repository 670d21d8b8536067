use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::cache;
use crate::paging::PagingConfig;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub paging: PagingSection,
  pub cache: CacheConfig,
  pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
  /// Service root; the versioned page endpoint is resolved against it
  pub base_url: String,
  /// Fixed seed for a reproducible data set (derived per install if unset)
  pub seed: Option<String>,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://randomuser.me/".to_string(),
      seed: None,
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PagingSection {
  pub page_size: u32,
  pub prefetch_distance: usize,
  pub initial_load_size: usize,
}

impl Default for PagingSection {
  fn default() -> Self {
    let defaults = PagingConfig::default();
    Self {
      page_size: defaults.page_size,
      prefetch_distance: defaults.prefetch_distance,
      initial_load_size: defaults.initial_load_size,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  /// Persist to SQLite; when off everything lives in memory for the run
  pub enabled: bool,
  /// Database file (default: $XDG_DATA_HOME/lydia/cache.db)
  pub path: Option<PathBuf>,
  /// Refresh on start even when cached rows exist
  pub refresh_on_start: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      refresh_on_start: true,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectivityConfig {
  pub probe_interval_secs: u64,
  pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: 5,
      probe_timeout_ms: 1500,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./lydia.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/lydia/config.yaml
  ///
  /// Without a file the defaults are used. LYDIA_API_URL and LYDIA_SEED
  /// override the file either way.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("lydia.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("lydia").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty document is valid and means "all defaults"
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("LYDIA_API_URL").filter(|v| !v.trim().is_empty()) {
      self.api.base_url = url;
    }
    if let Some(seed) = lookup("LYDIA_SEED").filter(|v| !v.trim().is_empty()) {
      self.api.seed = Some(seed);
    }
  }

  /// Where the SQLite cache lives.
  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache.path {
      Some(path) => Ok(path.clone()),
      None => cache::default_path(),
    }
  }

  /// The configured seed, or one derived from the cache location.
  ///
  /// The derived seed is stable for an install, so cursor keys written in one
  /// run still address the same remote pages in the next.
  pub fn seed(&self, cache_path: &Path) -> String {
    match &self.api.seed {
      Some(seed) => seed.clone(),
      None => derive_seed(cache_path),
    }
  }

  /// Identifies which remote pages a cache was filled from. Cursor keys from
  /// one source are meaningless under another.
  pub fn page_source(&self, seed: &str) -> String {
    format!("{}|{}|{}", self.api.base_url, seed, self.paging().page_size)
  }

  pub fn paging(&self) -> PagingConfig {
    PagingConfig {
      page_size: self.paging.page_size.max(1),
      prefetch_distance: self.paging.prefetch_distance,
      initial_load_size: self.paging.initial_load_size.max(1),
    }
  }
}

fn derive_seed(cache_path: &Path) -> String {
  let digest = Sha256::digest(cache_path.to_string_lossy().as_bytes());
  let mut seed = hex::encode(digest);
  seed.truncate(16);
  seed
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn test_empty_document_is_defaults() {
    assert_eq!(Config::parse("").unwrap(), Config::default());
    assert_eq!(Config::parse("  \n").unwrap(), Config::default());
  }

  #[test]
  fn test_partial_sections_fill_defaults() {
    let yaml = r#"
api:
  seed: fixed
paging:
  page_size: 50
cache:
  enabled: false
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.api.seed.as_deref(), Some("fixed"));
    assert_eq!(config.api.base_url, ApiConfig::default().base_url);
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.paging.page_size, 50);
    assert_eq!(config.paging.prefetch_distance, 10);
    assert!(!config.cache.enabled);
    assert!(config.cache.refresh_on_start);
    assert_eq!(config.connectivity, ConnectivityConfig::default());
  }

  #[test]
  fn test_invalid_yaml_is_an_error() {
    assert!(Config::parse("paging: [1, 2").is_err());
    assert!(Config::parse("paging:\n  page_size: lots").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    let err = Config::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lydia.yaml");
    std::fs::write(&path, "connectivity:\n  probe_interval_secs: 9\n").unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.connectivity.probe_interval_secs, 9);
    assert_eq!(config.connectivity.probe_timeout_ms, 1500);
  }

  #[test]
  fn test_env_overrides() {
    let env: HashMap<&str, &str> = [
      ("LYDIA_API_URL", "http://localhost:9000/"),
      ("LYDIA_SEED", ""),
    ]
    .into_iter()
    .collect();
    let mut config = Config::default();
    config.api.seed = Some("from-file".to_string());

    config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.api.base_url, "http://localhost:9000/");
    // Blank values do not override
    assert_eq!(config.api.seed.as_deref(), Some("from-file"));
  }

  #[test]
  fn test_derived_seed_is_stable_per_path() {
    let config = Config::default();
    let a = config.seed(Path::new("/tmp/a/cache.db"));

    assert_eq!(a.len(), 16);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(a, config.seed(Path::new("/tmp/a/cache.db")));
    assert_ne!(a, config.seed(Path::new("/tmp/b/cache.db")));
  }

  #[test]
  fn test_configured_seed_wins() {
    let mut config = Config::default();
    config.api.seed = Some("abc".to_string());
    assert_eq!(config.seed(Path::new("/tmp/a/cache.db")), "abc");
  }

  #[test]
  fn test_page_source_tracks_seed_and_page_size() {
    let mut config = Config::default();
    let source = config.page_source("abc");
    assert_eq!(source, "https://randomuser.me/|abc|20");
    assert_ne!(source, config.page_source("abd"));

    config.paging.page_size = 50;
    assert_ne!(source, config.page_source("abc"));
  }

  #[test]
  fn test_paging_clamps_zero_sizes() {
    let mut config = Config::default();
    config.paging.page_size = 0;
    config.paging.initial_load_size = 0;

    let paging = config.paging();
    assert_eq!(paging.page_size, 1);
    assert_eq!(paging.initial_load_size, 1);
  }
}
