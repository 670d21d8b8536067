//! Remote mediator: keeps the local cache in step with the remote page source.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, field, info, instrument, warn, Span};

use super::types::{
  InitializeAction, LoadRequest, MediatorOutcome, PageRequest, PagingState, RemoteFetcher,
  FIRST_PAGE,
};
use crate::cache::{Cacheable, CursorKey, PagingStore, StoreTransaction};
use crate::error::{classify, ErrorKind};

/// Loads remote pages into a [`PagingStore`].
///
/// Loads never overlap: each call holds the mediator's lock from page
/// resolution through commit, and waiting calls run in arrival order, so a
/// later refresh always commits after an earlier one.
pub struct RemoteMediator<F, S> {
  fetcher: F,
  store: Arc<S>,
  page_size: u32,
  seed: String,
  load_lock: Mutex<()>,
}

impl<F, S> RemoteMediator<F, S>
where
  F: RemoteFetcher,
  S: PagingStore<F::Item>,
{
  pub fn new(fetcher: F, store: Arc<S>, page_size: u32, seed: impl Into<String>) -> Self {
    Self {
      fetcher,
      store,
      page_size,
      seed: seed.into(),
      load_lock: Mutex::new(()),
    }
  }

  /// Decide whether a refresh should run before cached data is served.
  pub fn initialize(&self, refresh_on_start: bool) -> Result<InitializeAction> {
    if !refresh_on_start && self.store.count()? > 0 {
      return Ok(InitializeAction::SkipInitialRefresh);
    }
    Ok(InitializeAction::LaunchInitialRefresh)
  }

  /// Load one page for `request`.
  ///
  /// Never retries: a failed load is retried by calling `load` again. If the
  /// returned future is dropped before the fetch completes, nothing is written.
  #[instrument(
    skip_all,
    fields(entity = <F::Item as Cacheable>::entity_type(), request = ?request, page = field::Empty)
  )]
  pub async fn load(&self, request: LoadRequest, state: &PagingState) -> MediatorOutcome {
    let _guard = self.load_lock.lock().await;

    let page = match self.target_page(request, state) {
      Ok(Some(page)) => page,
      Ok(None) => {
        debug!("no page to load");
        return MediatorOutcome::end_reached();
      }
      Err(e) => {
        warn!(error = %e, "failed to resolve page");
        return MediatorOutcome::Error(ErrorKind::Unknown(e.to_string()));
      }
    };
    Span::current().record("page", page);

    let fetched = self
      .fetcher
      .fetch_page(PageRequest {
        page,
        page_size: self.page_size,
        seed: self.seed.clone(),
      })
      .await;

    let result = match fetched {
      Ok(result) => result,
      Err(raw) => {
        let kind = classify(&raw);
        warn!(error = %raw, ?kind, "page fetch failed");
        return MediatorOutcome::Error(kind);
      }
    };
    // Keys always follow the requested page; an echo mismatch is only worth a note.
    if result.page_number != page || result.page_size != self.page_size {
      warn!(
        echoed_page = result.page_number,
        echoed_size = result.page_size,
        "source echoed different paging parameters"
      );
    }

    match self.commit(request, page, &result.items) {
      Ok(end_of_pagination_reached) => {
        info!(
          items = result.items.len(),
          end_of_pagination_reached, "page committed"
        );
        MediatorOutcome::Success {
          end_of_pagination_reached,
        }
      }
      Err(e) => {
        error!(error = %e, "page commit rolled back");
        MediatorOutcome::Error(ErrorKind::Unknown(e.to_string()))
      }
    }
  }

  /// Page to fetch for `request`, or `None` when there is nothing to load.
  fn target_page(&self, request: LoadRequest, state: &PagingState) -> Result<Option<u32>> {
    match request {
      LoadRequest::Refresh => Ok(Some(FIRST_PAGE)),
      LoadRequest::Prepend => Ok(None),
      LoadRequest::Append => {
        let Some(last_id) = state.last_item_id() else {
          return Ok(None);
        };
        let key = self.store.key_for(last_id)?;
        Ok(key.and_then(|k| k.next_page))
      }
    }
  }

  /// Write a fetched page. Returns whether pagination has ended.
  fn commit(&self, request: LoadRequest, page: u32, items: &[F::Item]) -> Result<bool> {
    let end_of_pagination = items.is_empty();
    if end_of_pagination && request != LoadRequest::Refresh {
      return Ok(true);
    }

    let keys = page_keys(page, items)?;
    let clear = request == LoadRequest::Refresh;

    self
      .store
      .transaction(&mut |tx: &mut dyn StoreTransaction<F::Item>| {
        if clear {
          tx.clear_items()?;
          tx.clear_keys()?;
        }
        // Keys first so an item is never readable without its key.
        tx.upsert_keys(&keys)?;
        tx.upsert_items(items)
      })?;

    Ok(end_of_pagination)
  }
}

/// Cursor keys for every item of `page`; all items share the same tokens.
fn page_keys<T: Cacheable>(page: u32, items: &[T]) -> Result<Vec<CursorKey>> {
  let prev_page = (page > FIRST_PAGE).then(|| page - 1);
  let next_page = if items.is_empty() {
    None
  } else {
    Some(
      page
        .checked_add(1)
        .ok_or_else(|| eyre!("Page token overflow after page {}", page))?,
    )
  };

  Ok(
    items
      .iter()
      .map(|item| CursorKey {
        item_id: item.cache_key(),
        prev_page,
        next_page,
      })
      .collect(),
  )
}
