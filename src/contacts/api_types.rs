//! Serde types for the random user API responses.

use serde::Deserialize;

use super::types::Contact;
use crate::paging::PageResult;

/// Response for `GET /api/1.3/`
#[derive(Debug, Deserialize)]
pub struct ApiContactListResponse {
  pub results: Vec<ApiContact>,
  pub info: ApiInfo,
}

#[derive(Debug, Deserialize)]
pub struct ApiInfo {
  #[allow(dead_code)]
  pub seed: String,
  pub results: u32,
  pub page: u32,
  #[allow(dead_code)]
  pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiContact {
  pub login: ApiLogin,
  #[serde(default)]
  pub gender: String,
  pub name: ApiName,
  pub location: ApiLocation,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub phone: String,
  pub picture: ApiPicture,
  pub dob: ApiDate,
  pub registered: ApiDate,
}

#[derive(Debug, Deserialize)]
pub struct ApiLogin {
  pub uuid: String,
  #[serde(default)]
  pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiName {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub first: String,
  #[serde(default)]
  pub last: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiLocation {
  #[serde(default)]
  pub city: String,
  #[serde(default)]
  pub country: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiPicture {
  #[serde(default)]
  pub large: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiDate {
  #[serde(default)]
  pub date: String,
  #[serde(default)]
  pub age: u32,
}

impl ApiName {
  /// "Title First Last", skipping blank parts.
  fn full_name(&self) -> String {
    [&self.title, &self.first, &self.last]
      .into_iter()
      .map(|part| part.trim())
      .filter(|part| !part.is_empty())
      .collect::<Vec<_>>()
      .join(" ")
  }
}

impl ApiContact {
  pub fn into_contact(self) -> Contact {
    Contact {
      full_name: self.name.full_name(),
      id: self.login.uuid,
      username: self.login.username,
      gender: self.gender,
      email: self.email,
      phone: self.phone,
      avatar_url: self.picture.large,
      city: self.location.city,
      country: self.location.country,
      age: self.dob.age,
      registered_date: self.registered.date,
    }
  }
}

impl ApiContactListResponse {
  pub fn into_page_result(self) -> PageResult<Contact> {
    PageResult {
      items: self
        .results
        .into_iter()
        .map(ApiContact::into_contact)
        .collect(),
      page_number: self.info.page,
      page_size: self.info.results,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const PAGE_JSON: &str = r#"{
    "results": [
      {
        "gender": "female",
        "name": { "title": "Mrs", "first": "Jane", "last": "Doe" },
        "location": {
          "street": { "number": 10, "name": "Main St" },
          "city": "Paris",
          "state": "IDF",
          "country": "France",
          "postcode": 75000,
          "coordinates": { "latitude": "48.8566", "longitude": "2.3522" },
          "timezone": { "offset": "+1:00", "description": "Paris" }
        },
        "email": "jane.doe@example.com",
        "login": {
          "uuid": "123-45-6789",
          "username": "user1",
          "password": "pass",
          "salt": "s",
          "md5": "md5",
          "sha1": "sha1",
          "sha256": "sha256"
        },
        "dob": { "date": "1990-05-20T10:00:00.000Z", "age": 33 },
        "registered": { "date": "2010-01-01T00:00:00.000Z", "age": 13 },
        "phone": "0123456789",
        "cell": "0987654321",
        "id": { "name": "SSN", "value": null },
        "picture": {
          "large": "https://example.com/large.jpg",
          "medium": "https://example.com/med.jpg",
          "thumbnail": "https://example.com/thumb.jpg"
        },
        "nat": "FR"
      }
    ],
    "info": { "seed": "lydia", "results": 20, "page": 3, "version": "1.3" }
  }"#;

  #[test]
  fn test_parse_page() {
    let response: ApiContactListResponse = serde_json::from_str(PAGE_JSON).unwrap();
    let page = response.into_page_result();

    assert_eq!(page.page_number, 3);
    assert_eq!(page.page_size, 20);
    assert_eq!(page.items.len(), 1);

    let contact = &page.items[0];
    assert_eq!(contact.id, "123-45-6789");
    assert_eq!(contact.full_name, "Mrs Jane Doe");
    assert_eq!(contact.username, "user1");
    assert_eq!(contact.email, "jane.doe@example.com");
    assert_eq!(contact.phone, "0123456789");
    assert_eq!(contact.avatar_url, "https://example.com/large.jpg");
    assert_eq!(contact.city, "Paris");
    assert_eq!(contact.country, "France");
    assert_eq!(contact.age, 33);
    assert_eq!(contact.registered_date, "2010-01-01T00:00:00.000Z");
  }

  #[test]
  fn test_full_name_skips_blank_title() {
    let name = ApiName {
      title: "".to_string(),
      first: "John".to_string(),
      last: "Doe".to_string(),
    };
    assert_eq!(name.full_name(), "John Doe");

    let name = ApiName {
      title: "Mr".to_string(),
      first: " ".to_string(),
      last: "Doe".to_string(),
    };
    assert_eq!(name.full_name(), "Mr Doe");
  }

  #[test]
  fn test_empty_results() {
    let json = r#"{
      "results": [],
      "info": { "seed": "s", "results": 20, "page": 9, "version": "1.3" }
    }"#;
    let response: ApiContactListResponse = serde_json::from_str(json).unwrap();
    let page = response.into_page_result();
    assert!(page.items.is_empty());
    assert_eq!(page.page_number, 9);
  }
}
