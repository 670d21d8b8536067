//! In-process paging store.
//!
//! Used when the on-disk cache is disabled: the app still pages through the
//! remote source, but nothing survives a restart. Transactions run against a
//! staged copy of the tables that replaces the live copy only on success.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

use super::traits::{
  Cacheable, CursorKey, CursorKeyStore, ItemStore, PagingStore, StoreTransaction, StoreVersion,
};

#[derive(Clone)]
struct Tables<T> {
  /// Items in position order
  items: Vec<T>,
  /// Item key -> index into `items`
  index: HashMap<String, usize>,
  keys: HashMap<String, CursorKey>,
  cleared: bool,
  dirty: bool,
}

impl<T> Default for Tables<T> {
  fn default() -> Self {
    Self {
      items: Vec::new(),
      index: HashMap::new(),
      keys: HashMap::new(),
      cleared: false,
      dirty: false,
    }
  }
}

impl<T: Cacheable> StoreTransaction<T> for Tables<T> {
  fn clear_items(&mut self) -> Result<()> {
    self.items.clear();
    self.index.clear();
    self.cleared = true;
    self.dirty = true;
    Ok(())
  }

  fn clear_keys(&mut self) -> Result<()> {
    self.keys.clear();
    self.cleared = true;
    self.dirty = true;
    Ok(())
  }

  fn upsert_keys(&mut self, keys: &[CursorKey]) -> Result<()> {
    for key in keys {
      self.keys.insert(key.item_id.clone(), key.clone());
    }
    self.dirty |= !keys.is_empty();
    Ok(())
  }

  fn upsert_items(&mut self, items: &[T]) -> Result<()> {
    for item in items {
      let id = item.cache_key();
      match self.index.get(&id) {
        Some(&at) => self.items[at] = item.clone(),
        None => {
          self.index.insert(id, self.items.len());
          self.items.push(item.clone());
        }
      }
    }
    self.dirty |= !items.is_empty();
    Ok(())
  }
}

/// Paging store kept entirely in memory.
pub struct MemoryStorage<T> {
  tables: Mutex<Tables<T>>,
  versions: watch::Sender<StoreVersion>,
}

impl<T: Cacheable> MemoryStorage<T> {
  pub fn new() -> Self {
    Self {
      tables: Mutex::new(Tables::default()),
      versions: watch::channel(StoreVersion::default()).0,
    }
  }

  fn lock(&self) -> Result<MutexGuard<'_, Tables<T>>> {
    self
      .tables
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl<T: Cacheable> Default for MemoryStorage<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Cacheable> PagingStore<T> for MemoryStorage<T> {
  fn transaction(
    &self,
    work: &mut dyn FnMut(&mut dyn StoreTransaction<T>) -> Result<()>,
  ) -> Result<()> {
    let mut tables = self.lock()?;

    let mut staged = tables.clone();
    staged.cleared = false;
    staged.dirty = false;
    work(&mut staged)?;

    let (cleared, dirty) = (staged.cleared, staged.dirty);
    *tables = staged;
    drop(tables);

    if dirty {
      self.versions.send_modify(|v| *v = v.next(cleared));
    }
    Ok(())
  }

  fn version(&self) -> StoreVersion {
    *self.versions.borrow()
  }

  fn subscribe(&self) -> watch::Receiver<StoreVersion> {
    self.versions.subscribe()
  }
}

impl<T: Cacheable> ItemStore<T> for MemoryStorage<T> {
  fn upsert_all(&self, items: &[T]) -> Result<()> {
    self.transaction(&mut |tx: &mut dyn StoreTransaction<T>| tx.upsert_items(items))
  }

  fn clear_all(&self) -> Result<()> {
    self.transaction(&mut |tx: &mut dyn StoreTransaction<T>| tx.clear_items())
  }

  fn count(&self) -> Result<usize> {
    Ok(self.lock()?.items.len())
  }

  fn read_range(&self, offset: usize, limit: usize) -> Result<Vec<T>> {
    let tables = self.lock()?;
    Ok(tables.items.iter().skip(offset).take(limit).cloned().collect())
  }

  fn get(&self, id: &str) -> Result<Option<T>> {
    let tables = self.lock()?;
    Ok(tables.index.get(id).map(|&at| tables.items[at].clone()))
  }
}

impl<T: Cacheable> CursorKeyStore for MemoryStorage<T> {
  fn upsert_keys(&self, keys: &[CursorKey]) -> Result<()> {
    self.transaction(&mut |tx: &mut dyn StoreTransaction<T>| tx.upsert_keys(keys))
  }

  fn key_for(&self, item_id: &str) -> Result<Option<CursorKey>> {
    Ok(self.lock()?.keys.get(item_id).cloned())
  }

  fn clear_keys(&self) -> Result<()> {
    self.transaction(&mut |tx: &mut dyn StoreTransaction<T>| tx.clear_keys())
  }
}
