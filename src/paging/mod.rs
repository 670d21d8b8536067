//! Paging over a remote, page-numbered source through the local cache.
//!
//! The [`RemoteMediator`] is the only writer: it fetches a page and commits
//! items with their cursor keys in one transaction. A [`PagedView`] reads the
//! cache back as a growing window and asks the mediator for more when the
//! consumer gets close to the end.

mod mediator;
mod search;
#[cfg(test)]
pub(crate) mod testing;
mod types;
mod view;

pub use mediator::RemoteMediator;
pub use search::{SearchResult, Searchable};
pub use types::{LoadState, MediatorOutcome, PageRequest, PageResult, RemoteFetcher};
pub use view::{PagedView, PagingConfig, ViewSnapshot};
