//! Network reachability of the API host.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::PagingStore;
use crate::config::ConnectivityConfig;
use crate::paging::{MediatorOutcome, PagedView, RemoteFetcher};

/// Periodically probes whether the API host accepts TCP connections.
#[derive(Debug, Clone)]
pub struct ConnectivityObserver {
  target: String,
  interval: Duration,
  timeout: Duration,
}

impl ConnectivityObserver {
  pub fn for_endpoint(endpoint: &Url, config: &ConnectivityConfig) -> Result<Self> {
    let host = endpoint
      .host_str()
      .ok_or_else(|| eyre!("API url has no host: {}", endpoint))?;
    let port = endpoint
      .port_or_known_default()
      .ok_or_else(|| eyre!("API url has no port: {}", endpoint))?;

    Ok(Self {
      target: format!("{}:{}", host, port),
      interval: Duration::from_secs(config.probe_interval_secs.max(1)),
      timeout: Duration::from_millis(config.probe_timeout_ms),
    })
  }

  pub fn target(&self) -> &str {
    &self.target
  }

  /// One reachability check. Name resolution failures count as offline.
  pub async fn probe(&self) -> bool {
    match tokio::time::timeout(self.timeout, TcpStream::connect(&self.target)).await {
      Ok(Ok(_)) => true,
      Ok(Err(e)) => {
        debug!(host = %self.target, error = %e, "probe failed");
        false
      }
      Err(_) => {
        debug!(host = %self.target, "probe timed out");
        false
      }
    }
  }

  /// Probe once, then keep probing in the background.
  ///
  /// The receiver only sees a change when reachability actually flips.
  pub async fn spawn(self) -> (watch::Receiver<bool>, JoinHandle<()>) {
    let online = self.probe().await;
    let (tx, rx) = watch::channel(online);

    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.interval);
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let online = self.probe().await;
        tx.send_if_modified(|current| {
          if *current == online {
            return false;
          }
          info!(host = %self.target, online, "connectivity changed");
          *current = online;
          true
        });
        if tx.is_closed() {
          break;
        }
      }
    });

    (rx, handle)
  }
}

/// True only when going from offline to online.
pub fn is_reconnect(previous: bool, current: bool) -> bool {
  !previous && current
}

/// Refresh `view` every time connectivity comes back. Returns when the
/// observer goes away.
pub async fn refresh_on_reconnect<F, S>(
  view: Arc<PagedView<F, S>>,
  mut online: watch::Receiver<bool>,
) where
  F: RemoteFetcher,
  S: PagingStore<F::Item>,
{
  let mut previous = *online.borrow_and_update();
  while online.changed().await.is_ok() {
    let current = *online.borrow_and_update();
    if is_reconnect(previous, current) {
      info!("back online, refreshing");
      if let MediatorOutcome::Error(kind) = view.refresh().await {
        warn!(error = %kind, "refresh after reconnect failed");
      }
    }
    previous = current;
  }
}
