//! Core traits and types for the caching system.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::watch;

/// Trait for entities that can be cached.
///
/// Implementors must provide a unique cache key. The entity is persisted as
/// serialized JSON next to that key.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Unique identifier for this entity (e.g., a contact uuid)
  fn cache_key(&self) -> String;

  /// Entity type name, used in log output (e.g., "contact")
  fn entity_type() -> &'static str;
}

/// Pagination bookkeeping for a single cached item.
///
/// All items of one page share the same tokens; they are keyed by item id so
/// the pager can resume from whichever item ended up last in a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorKey {
  pub item_id: String,
  pub prev_page: Option<u32>,
  pub next_page: Option<u32>,
}

/// Version stamp published by a store after every committed write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreVersion {
  /// Bumped whenever the tables were cleared (full invalidation)
  pub generation: u64,
  /// Bumped on every committed write
  pub revision: u64,
}

impl StoreVersion {
  pub(crate) fn next(self, cleared: bool) -> Self {
    Self {
      generation: if cleared {
        self.generation + 1
      } else {
        self.generation
      },
      revision: self.revision + 1,
    }
  }
}

/// Durable keyed table of cached items, read in insertion order.
pub trait ItemStore<T: Cacheable>: Send + Sync {
  /// Insert new items or replace existing ones (by key), keeping their position.
  fn upsert_all(&self, items: &[T]) -> Result<()>;

  /// Remove every item.
  fn clear_all(&self) -> Result<()>;

  /// Number of cached items.
  fn count(&self) -> Result<usize>;

  /// Read `limit` items starting at `offset`, ordered by position then key.
  fn read_range(&self, offset: usize, limit: usize) -> Result<Vec<T>>;

  /// Get a single item by key.
  fn get(&self, id: &str) -> Result<Option<T>>;
}

/// Durable table mapping an item key to its page tokens.
pub trait CursorKeyStore: Send + Sync {
  fn upsert_keys(&self, keys: &[CursorKey]) -> Result<()>;

  fn key_for(&self, item_id: &str) -> Result<Option<CursorKey>>;

  fn clear_keys(&self) -> Result<()>;
}

/// Writes performed inside [`PagingStore::transaction`].
pub trait StoreTransaction<T: Cacheable> {
  fn clear_items(&mut self) -> Result<()>;

  fn clear_keys(&mut self) -> Result<()>;

  fn upsert_keys(&mut self, keys: &[CursorKey]) -> Result<()>;

  fn upsert_items(&mut self, items: &[T]) -> Result<()>;
}

/// Item and cursor key tables that commit together.
pub trait PagingStore<T: Cacheable>: ItemStore<T> + CursorKeyStore {
  /// Run `work` atomically. Nothing is visible to readers unless `work`
  /// returns `Ok` and the commit succeeds.
  fn transaction(
    &self,
    work: &mut dyn FnMut(&mut dyn StoreTransaction<T>) -> Result<()>,
  ) -> Result<()>;

  /// Current version of the tables.
  fn version(&self) -> StoreVersion;

  /// Observe committed writes.
  fn subscribe(&self) -> watch::Receiver<StoreVersion>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_version_next() {
    let v = StoreVersion::default();
    assert_eq!(
      v.next(false),
      StoreVersion {
        generation: 0,
        revision: 1
      }
    );
    assert_eq!(
      v.next(true).next(false),
      StoreVersion {
        generation: 1,
        revision: 2
      }
    );
  }
}
