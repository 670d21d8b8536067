use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;
use crate::paging::Searchable;

/// A cached contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
  pub id: String,
  pub full_name: String,
  pub username: String,
  pub gender: String,
  pub email: String,
  pub phone: String,
  pub avatar_url: String,
  pub city: String,
  pub country: String,
  pub age: u32,
  /// ISO 8601 registration timestamp, as sent by the API
  pub registered_date: String,
}

impl Contact {
  /// Registration time, if the API sent a parseable timestamp.
  pub fn registered_at(&self) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&self.registered_date)
      .ok()
      .map(|dt| dt.with_timezone(&Utc))
  }

  /// "City, Country", skipping blank parts.
  pub fn location(&self) -> String {
    [self.city.as_str(), self.country.as_str()]
      .into_iter()
      .filter(|part| !part.trim().is_empty())
      .collect::<Vec<_>>()
      .join(", ")
  }
}

impl Cacheable for Contact {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "contact"
  }
}

impl Searchable for Contact {
  fn display_name(&self) -> &str {
    &self.full_name
  }
}

#[cfg(test)]
pub(crate) fn test_contact(id: &str, full_name: &str) -> Contact {
  Contact {
    id: id.to_string(),
    full_name: full_name.to_string(),
    username: format!("user_{}", id),
    gender: "female".to_string(),
    email: format!("{}@example.com", id),
    phone: "0123456789".to_string(),
    avatar_url: format!("https://example.com/{}.jpg", id),
    city: "Paris".to_string(),
    country: "France".to_string(),
    age: 30,
    registered_date: "2010-01-01T00:00:00.000Z".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Datelike;

  #[test]
  fn test_registered_at() {
    let contact = test_contact("e1", "John Smith");
    let registered = contact.registered_at().unwrap();
    assert_eq!(registered.year(), 2010);

    let contact = Contact {
      registered_date: "2022-01-01".to_string(),
      ..test_contact("e2", "Jane")
    };
    assert!(contact.registered_at().is_none());
  }

  #[test]
  fn test_location_skips_blank_parts() {
    let contact = test_contact("e1", "John Smith");
    assert_eq!(contact.location(), "Paris, France");

    let contact = Contact {
      city: " ".to_string(),
      ..test_contact("e2", "Jane")
    };
    assert_eq!(contact.location(), "France");
  }
}
