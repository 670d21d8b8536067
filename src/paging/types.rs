use futures::future::BoxFuture;
use std::sync::Arc;

use crate::cache::Cacheable;
use crate::error::{ErrorKind, RawError};

/// First page of the remote source.
pub const FIRST_PAGE: u32 = 1;

/// Which edge of the data a load is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRequest {
  /// Start over from the first page, replacing the cache
  Refresh,
  /// Fetch the page after the last item of the window
  Append,
  /// Fetch the page before the first item (the source is forward-only)
  Prepend,
}

/// Parameters for a single page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
  pub page: u32,
  pub page_size: u32,
  pub seed: String,
}

/// A page as returned by the remote source.
#[derive(Debug, Clone)]
pub struct PageResult<T> {
  pub items: Vec<T>,
  pub page_number: u32,
  pub page_size: u32,
}

/// Source of remote pages.
pub trait RemoteFetcher: Send + Sync {
  type Item: Cacheable;

  fn fetch_page(
    &self,
    request: PageRequest,
  ) -> BoxFuture<'_, Result<PageResult<Self::Item>, RawError>>;
}

impl<F: RemoteFetcher> RemoteFetcher for Arc<F> {
  type Item = F::Item;

  fn fetch_page(
    &self,
    request: PageRequest,
  ) -> BoxFuture<'_, Result<PageResult<Self::Item>, RawError>> {
    (**self).fetch_page(request)
  }
}

/// Result of a mediator load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediatorOutcome {
  Success { end_of_pagination_reached: bool },
  Error(ErrorKind),
}

impl MediatorOutcome {
  pub fn end_reached() -> Self {
    MediatorOutcome::Success {
      end_of_pagination_reached: true,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, MediatorOutcome::Success { .. })
  }
}

/// Whether the pager should refresh before serving cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeAction {
  LaunchInitialRefresh,
  SkipInitialRefresh,
}

/// What the mediator needs to know about the consumer's window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingState {
  last_item_id: Option<String>,
}

impl PagingState {
  pub fn from_window<T: Cacheable>(window: &[T]) -> Self {
    Self {
      last_item_id: window.last().map(Cacheable::cache_key),
    }
  }

  pub fn last_item_id(&self) -> Option<&str> {
    self.last_item_id.as_deref()
  }
}

/// Load state of one edge of a paged view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
  #[default]
  Idle,
  Loading,
  Error(ErrorKind),
}

impl LoadState {
  pub fn is_loading(&self) -> bool {
    matches!(self, LoadState::Loading)
  }

  pub fn error(&self) -> Option<&ErrorKind> {
    match self {
      LoadState::Error(kind) => Some(kind),
      _ => None,
    }
  }
}
