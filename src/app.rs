use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::cache::PagingStore;
use crate::config::Config;
use crate::connectivity::{self, ConnectivityObserver};
use crate::contacts::{Contact, ContactsClient};
use crate::paging::{
  LoadState, MediatorOutcome, PagedView, RemoteMediator, SearchResult, ViewSnapshot,
};

/// What to do this run
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Reload from the first page, replacing the cache
  Refresh,
  /// Print the cached window, paging further if asked
  List {
    /// Number of pages to bring into view
    #[arg(short, long, default_value_t = 1)]
    pages: u32,
    /// Only show contacts whose name contains this (case-insensitive)
    #[arg(short, long)]
    search: Option<String>,
  },
  /// Print one cached contact
  Show { id: String },
  /// Stay running: refresh on reconnect and log window changes
  Watch,
}

type ContactsView<S> = PagedView<ContactsClient, S>;

/// Main application state
pub struct App<S> {
  config: Config,
  store: Arc<S>,
  view: Arc<ContactsView<S>>,
  endpoint: Url,
}

impl<S> App<S>
where
  S: PagingStore<Contact> + 'static,
{
  pub fn new(config: Config, store: Arc<S>, seed: String) -> Result<Self> {
    let client = ContactsClient::new(&config.api)?;
    let endpoint = client.endpoint().clone();
    let paging = config.paging();

    info!(endpoint = %endpoint, seed = %seed, page_size = paging.page_size, "starting");
    let mediator = Arc::new(RemoteMediator::new(
      client,
      store.clone(),
      paging.page_size,
      seed,
    ));
    let view = Arc::new(PagedView::new(mediator, store.clone(), paging));

    Ok(Self {
      config,
      store,
      view,
      endpoint,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Refresh => self.refresh().await,
      Command::List { pages, search } => self.list(pages, search.as_deref()).await,
      Command::Show { id } => self.show(&id),
      Command::Watch => self.watch().await,
    }
  }

  async fn refresh(&self) -> Result<()> {
    match self.view.refresh().await {
      MediatorOutcome::Success {
        end_of_pagination_reached,
      } => {
        let cached = self.store.count()?;
        println!("Refreshed: {} contacts cached", cached);
        if end_of_pagination_reached {
          println!("The source has no more pages");
        }
        Ok(())
      }
      MediatorOutcome::Error(kind) => Err(eyre!("Refresh failed: {}", kind)),
    }
  }

  async fn list(&self, pages: u32, search: Option<&str>) -> Result<()> {
    self.view.start(self.config.cache.refresh_on_start).await?;

    for _ in 1..pages {
      let snapshot = self.view.snapshot();
      if snapshot.end_of_pagination || snapshot.trailing.error().is_some() {
        break;
      }
      self.view.load_more().await;
    }

    let snapshot = self.view.snapshot();
    if let Some(kind) = snapshot.leading.error() {
      if kind.is_recoverable_by_reconnect() {
        println!("Offline, showing cached contacts");
      }
    }
    let result = snapshot.search(search.unwrap_or(""));
    print!("{}", render_list(&result));
    print!("{}", render_status(&snapshot));
    Ok(())
  }

  fn show(&self, id: &str) -> Result<()> {
    let contact = self
      .store
      .get(id)?
      .ok_or_else(|| eyre!("No cached contact with id {}", id))?;
    print!("{}", render_detail(&contact));
    Ok(())
  }

  async fn watch(&self) -> Result<()> {
    let observer = ConnectivityObserver::for_endpoint(&self.endpoint, &self.config.connectivity)?;
    let host = observer.target().to_string();
    let (online, probe_task) = observer.spawn().await;
    if !*online.borrow() {
      warn!(host = %host, "API host unreachable, serving cached contacts");
    }

    let mut updates = self.view.subscribe();
    self.view.start(self.config.cache.refresh_on_start).await?;
    print!("{}", render_status(&self.view.snapshot()));

    let store_task = self.view.clone().spawn_store_observer();
    let reconnect_task = tokio::spawn(connectivity::refresh_on_reconnect(
      self.view.clone(),
      online,
    ));

    loop {
      tokio::select! {
        changed = updates.changed() => {
          if changed.is_err() {
            break;
          }
          let snapshot = updates.borrow_and_update().clone();
          info!(
            items = snapshot.items.len(),
            generation = snapshot.generation,
            end = snapshot.end_of_pagination,
            "window changed"
          );
          print!("{}", render_status(&snapshot));
        }
        _ = tokio::signal::ctrl_c() => {
          info!("interrupted");
          break;
        }
      }
    }

    reconnect_task.abort();
    store_task.abort();
    probe_task.abort();
    Ok(())
  }
}

fn render_row(contact: &Contact) -> String {
  format!(
    "{:<38} {:<28} {:<32} {}",
    contact.id,
    contact.full_name,
    contact.email,
    contact.location()
  )
}

fn render_list(result: &SearchResult<'_, Contact>) -> String {
  match result {
    SearchResult::NotLoaded => "Nothing loaded yet\n".to_string(),
    SearchResult::Empty => "No contacts\n".to_string(),
    SearchResult::NoMatches => "No contacts match\n".to_string(),
    SearchResult::Matches(contacts) => contacts
      .iter()
      .map(|c| format!("{}\n", render_row(c)))
      .collect(),
  }
}

fn describe(state: &LoadState) -> String {
  match state {
    LoadState::Idle => "idle".to_string(),
    LoadState::Loading => "loading".to_string(),
    LoadState::Error(kind) => format!("error: {}", kind),
  }
}

fn render_status(snapshot: &ViewSnapshot<Contact>) -> String {
  let mut status = format!(
    "{} contacts in view | refresh: {} | more: {}",
    snapshot.items.len(),
    describe(&snapshot.leading),
    describe(&snapshot.trailing)
  );
  if snapshot.end_of_pagination {
    status.push_str(" | end of list");
  }
  status.push('\n');
  status
}

fn render_detail(contact: &Contact) -> String {
  let registered = contact
    .registered_at()
    .map(|at| at.format("%Y-%m-%d").to_string())
    .unwrap_or_else(|| contact.registered_date.clone());

  let mut out = String::new();
  out.push_str(&format!("{}\n", contact.full_name));
  out.push_str(&format!("  id:         {}\n", contact.id));
  out.push_str(&format!("  username:   {}\n", contact.username));
  out.push_str(&format!("  email:      {}\n", contact.email));
  out.push_str(&format!("  phone:      {}\n", contact.phone));
  out.push_str(&format!("  gender:     {}\n", contact.gender));
  out.push_str(&format!("  age:        {}\n", contact.age));
  out.push_str(&format!("  location:   {}\n", contact.location()));
  out.push_str(&format!("  registered: {}\n", registered));
  out.push_str(&format!("  avatar:     {}\n", contact.avatar_url));
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::contacts::test_contact;
  use crate::error::ErrorKind;

  #[test]
  fn test_render_list_states() {
    assert_eq!(render_list(&SearchResult::NotLoaded), "Nothing loaded yet\n");
    assert_eq!(render_list(&SearchResult::Empty), "No contacts\n");
    assert_eq!(render_list(&SearchResult::NoMatches), "No contacts match\n");

    let a = test_contact("a", "Ann Example");
    let b = test_contact("b", "Bob Example");
    let out = render_list(&SearchResult::Matches(vec![&a, &b]));
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with('a'));
    assert!(lines[1].contains("Bob Example"));
  }

  #[test]
  fn test_render_status() {
    let snapshot = ViewSnapshot {
      items: vec![test_contact("a", "Ann Example")],
      leading: LoadState::Idle,
      trailing: LoadState::Error(ErrorKind::UnresolvedAddress),
      end_of_pagination: false,
      generation: 1,
      loaded: true,
    };
    assert_eq!(
      render_status(&snapshot),
      "1 contacts in view | refresh: idle | more: error: No network connection\n"
    );

    let done = ViewSnapshot {
      trailing: LoadState::Idle,
      end_of_pagination: true,
      ..snapshot
    };
    assert!(render_status(&done).ends_with("| end of list\n"));
  }

  #[test]
  fn test_render_detail() {
    let contact = test_contact("a", "Ann Example");
    let out = render_detail(&contact);
    assert!(out.starts_with("Ann Example\n"));
    assert!(out.contains("  id:         a\n"));
    assert!(out.contains(&format!("  email:      {}\n", contact.email)));
  }
}
