//! Scripted remote source for pager tests.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::types::{PageRequest, PageResult, RemoteFetcher};
use crate::contacts::Contact;
use crate::error::RawError;

/// Serves pages from a table; pages that were never set come back empty.
pub(crate) struct ScriptedFetcher {
  pages: Mutex<HashMap<u32, Result<Vec<Contact>, RawError>>>,
  requests: Mutex<Vec<PageRequest>>,
  delay: Duration,
  echoed_page: Option<u32>,
  in_flight: AtomicUsize,
  max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self {
      pages: Mutex::new(HashMap::new()),
      requests: Mutex::new(Vec::new()),
      delay: Duration::ZERO,
      echoed_page: None,
      in_flight: AtomicUsize::new(0),
      max_in_flight: AtomicUsize::new(0),
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Report this page number back no matter which page was asked for.
  pub fn echoing_page(mut self, page: u32) -> Self {
    self.echoed_page = Some(page);
    self
  }

  pub fn set_page(&self, page: u32, items: Vec<Contact>) {
    self.pages.lock().unwrap().insert(page, Ok(items));
  }

  pub fn set_error(&self, page: u32, err: RawError) {
    self.pages.lock().unwrap().insert(page, Err(err));
  }

  pub fn requests(&self) -> Vec<PageRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn requested_pages(&self) -> Vec<u32> {
    self.requests().iter().map(|r| r.page).collect()
  }

  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight.load(Ordering::SeqCst)
  }
}

impl RemoteFetcher for ScriptedFetcher {
  type Item = Contact;

  fn fetch_page(
    &self,
    request: PageRequest,
  ) -> BoxFuture<'_, Result<PageResult<Contact>, RawError>> {
    async move {
      self.requests.lock().unwrap().push(request.clone());
      // The response is decided when the request is sent, not when it lands.
      let response = self
        .pages
        .lock()
        .unwrap()
        .get(&request.page)
        .cloned()
        .unwrap_or_else(|| Ok(Vec::new()));

      let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.max_in_flight.fetch_max(now, Ordering::SeqCst);
      if !self.delay.is_zero() {
        tokio::time::sleep(self.delay).await;
      }
      self.in_flight.fetch_sub(1, Ordering::SeqCst);

      response.map(|items| PageResult {
        items,
        page_number: self.echoed_page.unwrap_or(request.page),
        page_size: request.page_size,
      })
    }
    .boxed()
  }
}
