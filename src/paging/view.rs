//! Lazily-loading, observable window over the cache.

use color_eyre::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::mediator::RemoteMediator;
use super::search::{filter_by_query, SearchResult, Searchable};
use super::types::{
  InitializeAction, LoadRequest, LoadState, MediatorOutcome, PagingState, RemoteFetcher,
};
use crate::cache::PagingStore;
use crate::error::ErrorKind;

/// Window sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingConfig {
  /// Items per remote page, and per step when extending from the cache
  pub page_size: u32,
  /// Load more once a consumer reads this close to the end of the window
  pub prefetch_distance: usize,
  /// Items materialized when the window is (re)built from the start
  pub initial_load_size: usize,
}

impl Default for PagingConfig {
  fn default() -> Self {
    Self {
      page_size: 20,
      prefetch_distance: 10,
      initial_load_size: 60,
    }
  }
}

/// What consumers see.
#[derive(Debug, Clone)]
pub struct ViewSnapshot<T> {
  pub items: Vec<T>,
  /// Refresh edge
  pub leading: LoadState,
  /// Append edge
  pub trailing: LoadState,
  pub end_of_pagination: bool,
  /// Store generation the window was built from
  pub generation: u64,
  /// Whether anything has ever been materialized
  pub loaded: bool,
}

impl<T> Default for ViewSnapshot<T> {
  fn default() -> Self {
    Self {
      items: Vec::new(),
      leading: LoadState::Idle,
      trailing: LoadState::Idle,
      end_of_pagination: false,
      generation: 0,
      loaded: false,
    }
  }
}

impl<T: Searchable> ViewSnapshot<T> {
  pub fn search(&self, query: &str) -> SearchResult<'_, T> {
    filter_by_query(&self.items, self.loaded, query)
  }
}

/// Paged read view backed by a [`RemoteMediator`].
pub struct PagedView<F: RemoteFetcher, S> {
  mediator: Arc<RemoteMediator<F, S>>,
  store: Arc<S>,
  config: PagingConfig,
  state: Mutex<ViewSnapshot<F::Item>>,
  updates: watch::Sender<ViewSnapshot<F::Item>>,
  refreshes: AtomicUsize,
}

impl<F, S> PagedView<F, S>
where
  F: RemoteFetcher,
  S: PagingStore<F::Item>,
{
  pub fn new(mediator: Arc<RemoteMediator<F, S>>, store: Arc<S>, config: PagingConfig) -> Self {
    Self {
      mediator,
      store,
      config,
      state: Mutex::new(ViewSnapshot::default()),
      updates: watch::channel(ViewSnapshot::default()).0,
      refreshes: AtomicUsize::new(0),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot<F::Item>> {
    self.updates.subscribe()
  }

  pub fn snapshot(&self) -> ViewSnapshot<F::Item> {
    self.lock().clone()
  }

  /// Show cached rows, then refresh unless the mediator says the cache will do.
  pub async fn start(&self, refresh_on_start: bool) -> Result<()> {
    self.load_cached()?;
    match self.mediator.initialize(refresh_on_start)? {
      InitializeAction::LaunchInitialRefresh => {
        self.refresh().await;
      }
      InitializeAction::SkipInitialRefresh => debug!("serving cached window"),
    }
    Ok(())
  }

  /// Materialize the start of whatever is already cached.
  pub fn load_cached(&self) -> Result<()> {
    let mut state = self.lock();
    self.reset_window(&mut state, false)?;
    self.publish(&state);
    Ok(())
  }

  /// Reload from the first page and rebuild the window from the start.
  pub async fn refresh(&self) -> MediatorOutcome {
    let guard = EdgeGuard::refresh(self);
    {
      let mut state = self.lock();
      state.leading = LoadState::Loading;
      self.publish(&state);
    }

    let outcome = self
      .mediator
      .load(LoadRequest::Refresh, &PagingState::default())
      .await;
    let still_refreshing = guard.finish();

    let mut state = self.lock();
    match &outcome {
      MediatorOutcome::Success {
        end_of_pagination_reached,
      } => match self.reset_window(&mut state, true) {
        Ok(()) => {
          state.end_of_pagination = *end_of_pagination_reached;
          if !still_refreshing {
            state.leading = LoadState::Idle;
          }
        }
        Err(e) => state.leading = LoadState::Error(ErrorKind::Unknown(e.to_string())),
      },
      MediatorOutcome::Error(kind) => {
        if !still_refreshing {
          state.leading = LoadState::Error(kind.clone());
        }
      }
    }
    self.publish(&state);
    outcome
  }

  /// Extend the window at the trailing edge.
  ///
  /// No-op while an append or refresh is already running, or once the end of
  /// pagination was reached. Rows already cached past the window are served
  /// before anything is fetched.
  pub async fn load_more(&self) {
    let (paging_state, generation, window_len) = {
      let mut state = self.lock();
      if state.trailing.is_loading() || state.leading.is_loading() || state.end_of_pagination {
        return;
      }
      state.trailing = LoadState::Loading;
      self.publish(&state);
      (
        PagingState::from_window(&state.items),
        state.generation,
        state.items.len(),
      )
    };
    let guard = EdgeGuard::append(self);

    let outcome = match self.store.count() {
      Ok(count) if count > window_len => None,
      Ok(_) => Some(
        self
          .mediator
          .load(LoadRequest::Append, &paging_state)
          .await,
      ),
      Err(e) => Some(MediatorOutcome::Error(ErrorKind::Unknown(e.to_string()))),
    };
    guard.finish();

    let mut state = self.lock();
    if state.generation != generation || self.store.version().generation != generation {
      debug!("window invalidated while appending");
      state.trailing = LoadState::Idle;
      if let Err(e) = self.reset_window(&mut state, false) {
        state.trailing = LoadState::Error(ErrorKind::Unknown(e.to_string()));
      }
      self.publish(&state);
      return;
    }

    let extended = match outcome {
      None => self.extend_window(&mut state, self.config.page_size as usize),
      Some(MediatorOutcome::Success {
        end_of_pagination_reached,
      }) => {
        state.end_of_pagination = end_of_pagination_reached;
        self.extend_window(&mut state, usize::MAX)
      }
      Some(MediatorOutcome::Error(kind)) => Err(kind),
    };

    state.trailing = match extended {
      Ok(()) => LoadState::Idle,
      Err(kind) => LoadState::Error(kind),
    };
    self.publish(&state);
  }

  /// Item at `index`, loading more when it is within the prefetch distance of the end.
  pub async fn get(&self, index: usize) -> Option<F::Item> {
    let (item, near_end) = {
      let state = self.lock();
      (
        state.items.get(index).cloned(),
        index.saturating_add(self.config.prefetch_distance) >= state.items.len(),
      )
    };

    if near_end {
      self.load_more().await;
    }
    item.or_else(|| self.lock().items.get(index).cloned())
  }

  /// Re-run whichever edge failed.
  pub async fn retry(&self) {
    let (leading_failed, trailing_failed) = {
      let state = self.lock();
      (state.leading.error().is_some(), state.trailing.error().is_some())
    };

    if leading_failed {
      self.refresh().await;
    } else if trailing_failed {
      self.load_more().await;
    }
  }

  /// Catch up with writes made to the store by anyone.
  ///
  /// A new generation means the table was replaced, so the window starts over;
  /// otherwise the current range is re-read in place.
  pub fn sync_with_store(&self) -> Result<()> {
    let version = self.store.version();
    let mut state = self.lock();
    if version.generation != state.generation {
      self.reset_window(&mut state, false)?;
    } else {
      let len = state.items.len();
      state.items = self.store.read_range(0, len)?;
    }
    self.publish(&state);
    Ok(())
  }

  /// Keep the window in sync with the store until the task is aborted.
  pub fn spawn_store_observer(self: Arc<Self>) -> JoinHandle<()>
  where
    F: 'static,
    S: 'static,
  {
    let mut versions = self.store.subscribe();
    tokio::spawn(async move {
      while versions.changed().await.is_ok() {
        if let Err(e) = self.sync_with_store() {
          warn!(error = %e, "failed to re-read window");
        }
      }
    })
  }

  fn reset_window(&self, state: &mut ViewSnapshot<F::Item>, mark_loaded: bool) -> Result<()> {
    let version = self.store.version();
    state.items = self.store.read_range(0, self.config.initial_load_size)?;
    state.generation = version.generation;
    state.end_of_pagination = false;
    state.loaded |= mark_loaded || !state.items.is_empty();
    if !state.trailing.is_loading() {
      state.trailing = LoadState::Idle;
    }
    Ok(())
  }

  fn extend_window(
    &self,
    state: &mut ViewSnapshot<F::Item>,
    limit: usize,
  ) -> std::result::Result<(), ErrorKind> {
    let more = self
      .store
      .read_range(state.items.len(), limit)
      .map_err(|e| ErrorKind::Unknown(e.to_string()))?;
    state.items.extend(more);
    state.loaded = true;
    Ok(())
  }

}

impl<F: RemoteFetcher, S> PagedView<F, S> {
  fn lock(&self) -> MutexGuard<'_, ViewSnapshot<F::Item>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn publish(&self, state: &ViewSnapshot<F::Item>) {
    self.updates.send_replace(state.clone());
  }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Edge {
  Leading,
  Trailing,
}

/// Clears an edge's `Loading` state if the load future is dropped before it
/// finishes, so a cancelled load never blocks the next one.
struct EdgeGuard<'a, F: RemoteFetcher, S> {
  view: &'a PagedView<F, S>,
  edge: Edge,
  finished: bool,
}

impl<'a, F: RemoteFetcher, S> EdgeGuard<'a, F, S> {
  fn refresh(view: &'a PagedView<F, S>) -> Self {
    view.refreshes.fetch_add(1, Ordering::SeqCst);
    Self {
      view,
      edge: Edge::Leading,
      finished: false,
    }
  }

  fn append(view: &'a PagedView<F, S>) -> Self {
    Self {
      view,
      edge: Edge::Trailing,
      finished: false,
    }
  }

  /// Disarm the guard. Returns whether other refreshes are still running.
  fn finish(mut self) -> bool {
    self.finished = true;
    self.release()
  }

  fn release(&self) -> bool {
    match self.edge {
      Edge::Leading => self.view.refreshes.fetch_sub(1, Ordering::SeqCst) > 1,
      Edge::Trailing => false,
    }
  }
}

impl<F: RemoteFetcher, S> Drop for EdgeGuard<'_, F, S> {
  fn drop(&mut self) {
    if self.finished {
      return;
    }
    if self.release() {
      return;
    }

    debug!("load cancelled");
    let mut state = self.view.lock();
    let slot = match self.edge {
      Edge::Leading => &mut state.leading,
      Edge::Trailing => &mut state.trailing,
    };
    if slot.is_loading() {
      *slot = LoadState::Idle;
      self.view.publish(&state);
    }
  }
}
