//! Generic caching layer for paginated data and offline support.
//!
//! This module provides a source-agnostic cache that:
//! - Stores entities keyed by a unique id, read back in insertion order
//! - Tracks per-item page tokens so pagination resumes after a restart
//! - Commits items and tokens together in one transaction
//! - Publishes a version stamp after each commit so views can re-read

mod memory;
mod storage;
mod traits;

pub use memory::MemoryStorage;
pub use storage::{default_path, SqliteStorage};
pub use traits::{
  Cacheable, CursorKey, CursorKeyStore, ItemStore, PagingStore, StoreTransaction, StoreVersion,
};
