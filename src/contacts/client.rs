use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::contacts::api_types::ApiContactListResponse;
use crate::contacts::types::Contact;
use crate::error::RawError;
use crate::paging::{PageRequest, PageResult, RemoteFetcher};

/// Random user API client
#[derive(Clone)]
pub struct ContactsClient {
  http: reqwest::Client,
  endpoint: Url,
}

impl ContactsClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API url {}: {}", config.base_url, e))?;
    let endpoint = base
      .join("api/1.3/")
      .map_err(|e| eyre!("Invalid API url {}: {}", config.base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("lydia/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, endpoint })
  }

  /// The page endpoint, without query parameters.
  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }

  /// Fetch one page of contacts.
  ///
  /// The same `seed` always yields the same shuffled sequence, so pages can be
  /// requested independently without duplicates between them.
  pub async fn fetch_contacts(
    &self,
    page: u32,
    results: u32,
    seed: &str,
  ) -> Result<ApiContactListResponse, RawError> {
    debug!(page, results, "GET {}", self.endpoint);

    let response = self
      .http
      .get(self.endpoint.clone())
      .query(&[
        ("seed", seed.to_string()),
        ("results", results.to_string()),
        ("page", page.to_string()),
      ])
      .send()
      .await?
      .error_for_status()?;

    Ok(response.json().await?)
  }
}

impl RemoteFetcher for ContactsClient {
  type Item = Contact;

  fn fetch_page(
    &self,
    request: PageRequest,
  ) -> BoxFuture<'_, Result<PageResult<Contact>, RawError>> {
    async move {
      let response = self
        .fetch_contacts(request.page, request.page_size, &request.seed)
        .await?;
      Ok(response.into_page_result())
    }
    .boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{classify, ErrorKind};
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;
  use tokio::task::JoinHandle;

  /// Serve a single canned HTTP response and hand back the request head.
  async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut buf = vec![0u8; 4096];
      let n = socket.read(&mut buf).await.unwrap();
      let head = String::from_utf8_lossy(&buf[..n]).to_string();

      let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
      );
      socket.write_all(response.as_bytes()).await.unwrap();
      socket.shutdown().await.ok();
      head
    });

    (format!("http://{}", addr), handle)
  }

  fn client_for(base_url: String) -> ContactsClient {
    ContactsClient::new(&ApiConfig {
      base_url,
      ..ApiConfig::default()
    })
    .unwrap()
  }

  #[test]
  fn test_endpoint() {
    let client = client_for("https://randomuser.me".to_string());
    assert_eq!(client.endpoint().as_str(), "https://randomuser.me/api/1.3/");
  }

  #[tokio::test]
  async fn test_fetch_page_sends_paging_params() {
    let body = r#"{
      "results": [{
        "gender": "male",
        "name": { "title": "Mr", "first": "John", "last": "Doe" },
        "location": { "city": "Lyon", "country": "France" },
        "email": "john@example.com",
        "login": { "uuid": "u1", "username": "john" },
        "dob": { "date": "1990-01-01T00:00:00.000Z", "age": 34 },
        "registered": { "date": "2020-01-01T00:00:00.000Z", "age": 4 },
        "phone": "01",
        "picture": { "large": "https://example.com/u1.jpg" }
      }],
      "info": { "seed": "abc", "results": 20, "page": 2, "version": "1.3" }
    }"#;
    let (base_url, server) = serve_once("200 OK", body).await;
    let client = client_for(base_url);

    let page = client
      .fetch_page(PageRequest {
        page: 2,
        page_size: 20,
        seed: "abc".to_string(),
      })
      .await
      .unwrap();

    assert_eq!(page.page_number, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, "u1");
    assert_eq!(page.items[0].full_name, "Mr John Doe");

    let head = server.await.unwrap();
    assert!(
      head.starts_with("GET /api/1.3/?seed=abc&results=20&page=2 "),
      "unexpected request: {}",
      head
    );
  }

  #[tokio::test]
  async fn test_not_found_status() {
    let (base_url, _server) = serve_once("404 Not Found", "{}").await;
    let client = client_for(base_url);

    let err = client.fetch_contacts(1, 20, "abc").await.unwrap_err();
    assert!(matches!(err, RawError::Http { status: 404, .. }));
    assert_eq!(classify(&err), ErrorKind::NotFound);
  }

  #[tokio::test]
  async fn test_malformed_body_is_unknown() {
    let (base_url, _server) = serve_once("200 OK", r#"{"unexpected":true}"#).await;
    let client = client_for(base_url);

    let err = client.fetch_contacts(1, 20, "abc").await.unwrap_err();
    assert!(matches!(classify(&err), ErrorKind::Unknown(_)), "got {:?}", err);
  }
}
