//! SQLite implementation of the paging store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};

use super::traits::{
  Cacheable, CursorKey, CursorKeyStore, ItemStore, PagingStore, StoreTransaction, StoreVersion,
};

/// Bump whenever the table layout changes; older caches are dropped, not migrated.
pub const SCHEMA_VERSION: i64 = 4;

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Cached items (stores serialized JSON)
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_items_position ON items(position, id);

-- Page tokens per item, used to resume pagination
CREATE TABLE IF NOT EXISTS cursor_keys (
    item_id TEXT PRIMARY KEY,
    prev_page INTEGER,
    next_page INTEGER
);

-- What the cached pages were fetched with
CREATE TABLE IF NOT EXISTS cache_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const DROP_SCHEMA: &str = r#"
DROP TABLE IF EXISTS items;
DROP TABLE IF EXISTS cursor_keys;
DROP TABLE IF EXISTS cache_meta;
"#;

/// Get the default database path.
pub fn default_path() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("lydia").join("cache.db"))
}

/// SQLite-based paging store.
pub struct SqliteStorage<T> {
  conn: Mutex<Connection>,
  versions: watch::Sender<StoreVersion>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Cacheable> SqliteStorage<T> {
  /// Open the store at `path`, creating parent directories as needed.
  ///
  /// `source` identifies how pages are fetched (endpoint, seed, page size).
  /// Stored page tokens only address the same rows under the same source, so
  /// opening with a different one empties the cache.
  pub fn open(path: &Path, source: &str) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self::with_connection(conn)?;
    storage.bind_source(source)?;
    Ok(storage)
  }

  /// Open a throwaway in-memory store.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
      versions: watch::channel(StoreVersion::default()).0,
      _marker: PhantomData,
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Create the tables, dropping them first if they were written by another schema version.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    let version: i64 = conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read schema version: {}", e))?;

    if version != SCHEMA_VERSION {
      if version != 0 {
        info!(
          from = version,
          to = SCHEMA_VERSION,
          "cache schema changed, recreating tables"
        );
      }
      conn
        .execute_batch(DROP_SCHEMA)
        .map_err(|e| eyre!("Failed to drop cache tables: {}", e))?;
    }

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    conn
      .execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
      .map_err(|e| eyre!("Failed to write schema version: {}", e))?;

    Ok(())
  }

  fn bind_source(&self, source: &str) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let stored: Option<String> = tx
      .query_row(
        "SELECT value FROM cache_meta WHERE key = 'source'",
        [],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache source: {}", e))?;

    if stored.as_deref() == Some(source) {
      return Ok(());
    }
    if stored.is_some() {
      info!("page source changed, clearing cache");
    }

    tx.execute_batch("DELETE FROM items; DELETE FROM cursor_keys;")
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    tx.execute(
      "INSERT OR REPLACE INTO cache_meta (key, value) VALUES ('source', ?)",
      params![source],
    )
    .map_err(|e| eyre!("Failed to store cache source: {}", e))?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Writer handed to transaction closures.
struct SqliteTransaction<'a, T> {
  tx: &'a rusqlite::Transaction<'a>,
  cleared: bool,
  dirty: bool,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Cacheable> StoreTransaction<T> for SqliteTransaction<'_, T> {
  fn clear_items(&mut self) -> Result<()> {
    self
      .tx
      .execute("DELETE FROM items", [])
      .map_err(|e| eyre!("Failed to clear items: {}", e))?;
    self.cleared = true;
    self.dirty = true;
    Ok(())
  }

  fn clear_keys(&mut self) -> Result<()> {
    self
      .tx
      .execute("DELETE FROM cursor_keys", [])
      .map_err(|e| eyre!("Failed to clear cursor keys: {}", e))?;
    self.cleared = true;
    self.dirty = true;
    Ok(())
  }

  fn upsert_keys(&mut self, keys: &[CursorKey]) -> Result<()> {
    let mut stmt = self
      .tx
      .prepare_cached(
        "INSERT OR REPLACE INTO cursor_keys (item_id, prev_page, next_page) VALUES (?, ?, ?)",
      )
      .map_err(|e| eyre!("Failed to prepare cursor key insert: {}", e))?;

    for key in keys {
      stmt
        .execute(params![key.item_id, key.prev_page, key.next_page])
        .map_err(|e| eyre!("Failed to store cursor key {}: {}", key.item_id, e))?;
    }
    self.dirty |= !keys.is_empty();
    Ok(())
  }

  fn upsert_items(&mut self, items: &[T]) -> Result<()> {
    // Existing rows keep their position; new rows go after the last one.
    let mut stmt = self
      .tx
      .prepare_cached(
        "INSERT INTO items (id, position, data, cached_at)
         VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM items), ?2, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET data = excluded.data, cached_at = excluded.cached_at",
      )
      .map_err(|e| eyre!("Failed to prepare item upsert: {}", e))?;

    for item in items {
      let id = item.cache_key();
      let data =
        serde_json::to_vec(item).map_err(|e| eyre!("Failed to serialize {}: {}", id, e))?;
      stmt
        .execute(params![id, data])
        .map_err(|e| eyre!("Failed to store {} {}: {}", T::entity_type(), id, e))?;
    }
    self.dirty |= !items.is_empty();
    Ok(())
  }
}

impl<T: Cacheable> PagingStore<T> for SqliteStorage<T> {
  fn transaction(
    &self,
    work: &mut dyn FnMut(&mut dyn StoreTransaction<T>) -> Result<()>,
  ) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // Dropping `tx` on an early return rolls everything back.
    let (cleared, dirty) = {
      let mut writer = SqliteTransaction::<T> {
        tx: &tx,
        cleared: false,
        dirty: false,
        _marker: PhantomData,
      };
      work(&mut writer)?;
      (writer.cleared, writer.dirty)
    };

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    drop(conn);

    if dirty {
      self.versions.send_modify(|v| *v = v.next(cleared));
      debug!(cleared, "cache transaction committed");
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

impl<T: Cacheable> ItemStore<T> for SqliteStorage<T> {
  fn upsert_all(&self, items: &[T]) -> Result<()> {
    self.transaction(&mut |tx: &mut dyn StoreTransaction<T>| tx.upsert_items(items))
  }

  fn clear_all(&self) -> Result<()> {
    self.transaction(&mut |tx: &mut dyn StoreTransaction<T>| tx.clear_items())
  }

  fn count(&self) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count items: {}", e))?;
    usize::try_from(count).map_err(|e| eyre!("Invalid item count {}: {}", count, e))
  }

  fn read_range(&self, offset: usize, limit: usize) -> Result<Vec<T>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT data FROM items ORDER BY position, id LIMIT ? OFFSET ?")
      .map_err(|e| eyre!("Failed to prepare item query: {}", e))?;

    let rows = stmt
      .query_map(params![to_sql_int(limit), to_sql_int(offset)], |row| {
        row.get::<_, Vec<u8>>(0)
      })
      .map_err(|e| eyre!("Failed to query items: {}", e))?;

    let mut items = Vec::new();
    for data in rows {
      let data = data.map_err(|e| eyre!("Failed to read item row: {}", e))?;
      let item: T = serde_json::from_slice(&data)
        .map_err(|e| eyre!("Failed to deserialize {}: {}", T::entity_type(), e))?;
      items.push(item);
    }
    Ok(items)
  }

  fn get(&self, id: &str) -> Result<Option<T>> {
    let conn = self.lock()?;
    let data: Option<Vec<u8>> = conn
      .query_row("SELECT data FROM items WHERE id = ?", params![id], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to query {}: {}", id, e))?;

    match data {
      Some(data) => {
        let item = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize {}: {}", id, e))?;
        Ok(Some(item))
      }
      None => Ok(None),
    }
  }
}

impl<T: Cacheable> CursorKeyStore for SqliteStorage<T> {
  fn upsert_keys(&self, keys: &[CursorKey]) -> Result<()> {
    self.transaction(&mut |tx: &mut dyn StoreTransaction<T>| tx.upsert_keys(keys))
  }

  fn key_for(&self, item_id: &str) -> Result<Option<CursorKey>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT item_id, prev_page, next_page FROM cursor_keys WHERE item_id = ?",
        params![item_id],
        |row| {
          Ok(CursorKey {
            item_id: row.get(0)?,
            prev_page: row.get(1)?,
            next_page: row.get(2)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cursor key for {}: {}", item_id, e))
  }

  fn clear_keys(&self) -> Result<()> {
    self.transaction(&mut |tx: &mut dyn StoreTransaction<T>| tx.clear_keys())
  }
}

fn to_sql_int(n: usize) -> i64 {
  i64::try_from(n).unwrap_or(i64::MAX)
}
