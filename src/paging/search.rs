//! Client-side search over a materialized window.

/// Items that can be matched by a display name.
pub trait Searchable {
  fn display_name(&self) -> &str;
}

/// Outcome of filtering a window.
#[derive(Debug, PartialEq, Eq)]
pub enum SearchResult<'a, T> {
  /// Nothing has been loaded yet
  NotLoaded,
  /// Loaded, but there are no items at all
  Empty,
  /// Items exist but none matches the query
  NoMatches,
  Matches(Vec<&'a T>),
}

impl<T> SearchResult<'_, T> {
  pub fn matches(&self) -> &[&T] {
    match self {
      SearchResult::Matches(items) => items,
      _ => &[],
    }
  }
}

/// Case-insensitive substring match on the display name.
///
/// Works only on what is already in `items`; it never loads more.
/// The query is matched as typed, so an empty query matches everything.
pub fn filter_by_query<'a, T: Searchable>(
  items: &'a [T],
  loaded: bool,
  query: &str,
) -> SearchResult<'a, T> {
  if !loaded {
    return SearchResult::NotLoaded;
  }
  if items.is_empty() {
    return SearchResult::Empty;
  }

  let needle = query.to_lowercase();
  let matches: Vec<&T> = items
    .iter()
    .filter(|item| item.display_name().to_lowercase().contains(&needle))
    .collect();

  if matches.is_empty() {
    SearchResult::NoMatches
  } else {
    SearchResult::Matches(matches)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Named(&'static str);

  impl Searchable for Named {
    fn display_name(&self) -> &str {
      self.0
    }
  }

  fn names(result: &SearchResult<'_, Named>) -> Vec<&'static str> {
    result.matches().iter().map(|n| n.0).collect()
  }

  #[test]
  fn test_case_insensitive_substring() {
    let items = [Named("Jane Doe"), Named("John Smith"), Named("Joan DOE")];
    let result = filter_by_query(&items, true, "doe");
    assert_eq!(names(&result), vec!["Jane Doe", "Joan DOE"]);
  }

  #[test]
  fn test_empty_query_matches_all() {
    let items = [Named("Jane Doe"), Named("John Smith")];
    assert_eq!(filter_by_query(&items, true, "").matches().len(), 2);
  }

  #[test]
  fn test_query_is_not_trimmed() {
    let items = [Named("Jane Doe"), Named("Johnson")];
    assert_eq!(names(&filter_by_query(&items, true, "e d")), vec!["Jane Doe"]);
    assert!(matches!(
      filter_by_query(&items, true, " john"),
      SearchResult::NoMatches
    ));
  }

  #[test]
  fn test_three_empty_states_are_distinct() {
    let none: [Named; 0] = [];
    assert!(matches!(
      filter_by_query(&none, false, "x"),
      SearchResult::NotLoaded
    ));
    assert!(matches!(
      filter_by_query(&none, true, "x"),
      SearchResult::Empty
    ));

    let items = [Named("Jane Doe")];
    assert!(matches!(
      filter_by_query(&items, true, "zed"),
      SearchResult::NoMatches
    ));
  }
}
