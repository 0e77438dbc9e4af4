use std::str::FromStr;

use tracing::{
  debug,
  trace
};

use crate::task::{
  Category,
  Priority,
  Status,
  Task
};

pub const WILDCARD: &str = "all";

/// One field of a filter: either the `all` wildcard or an exact value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Match<T> {
  #[default]
  All,
  Only(T)
}

impl<T: PartialEq> Match<T> {
  pub fn accepts(
    &self,
    value: &T
  ) -> bool {
    match self {
      | Match::All => true,
      | Match::Only(expected) => {
        expected == value
      }
    }
  }
}

impl<T> FromStr for Match<T>
where
  T: FromStr
{
  type Err = T::Err;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    if trimmed.is_empty()
      || trimmed
        .eq_ignore_ascii_case(WILDCARD)
    {
      return Ok(Match::All);
    }
    trimmed.parse().map(Match::Only)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryMatch {
  #[default]
  All,
  /// Tasks without a category, including ones whose reference no longer
  /// resolves.
  Uncategorized,
  Id(String)
}

/// Conjunction of a text search and three equality predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
  pub search:   String,
  pub status:   Match<Status>,
  pub priority: Match<Priority>,
  pub category: CategoryMatch
}

impl TaskFilter {
  pub fn is_wildcard(&self) -> bool {
    self.search.trim().is_empty()
      && self.status == Match::All
      && self.priority == Match::All
      && self.category
        == CategoryMatch::All
  }

  /// Builds a filter from command-line terms. `status:`, `priority:`
  /// (`pri:`) and `category:` (`cat:`) terms set the predicates; every
  /// other word joins the search text.
  #[tracing::instrument(skip(
    terms,
    resolve_category
  ))]
  pub fn from_terms<F>(
    terms: &[String],
    mut resolve_category: F
  ) -> anyhow::Result<Self>
  where
    F: FnMut(
      &str
    )
      -> anyhow::Result<String>
  {
    let mut filter = Self::default();
    let mut words = Vec::new();

    for term in terms {
      let Some((key, value)) =
        term.split_once(':')
      else {
        words.push(term.as_str());
        continue;
      };

      match key
        .to_ascii_lowercase()
        .as_str()
      {
        | "status" => {
          filter.status = value.parse()?;
        }
        | "pri" | "priority" => {
          filter.priority =
            value.parse()?;
        }
        | "cat" | "category" => {
          filter.category =
            match value.trim() {
              | v if v.eq_ignore_ascii_case(
                WILDCARD
              ) =>
              {
                CategoryMatch::All
              }
              | "" | "none" => {
                CategoryMatch::Uncategorized
              }
              | v => CategoryMatch::Id(
                resolve_category(v)?
              )
            };
        }
        | _ => words.push(term.as_str())
      }
    }

    filter.search = words.join(" ");
    debug!(?filter, "built task filter");
    Ok(filter)
  }

  pub fn matches(
    &self,
    task: &Task,
    categories: &[Category]
  ) -> bool {
    let ok = self.matches_search(task)
      && self.status.accepts(&task.status)
      && self
        .priority
        .accepts(&task.priority)
      && self.matches_category(
        task, categories
      );
    trace!(task = %task.id, ok, "evaluated filter");
    ok
  }

  fn matches_search(
    &self,
    task: &Task
  ) -> bool {
    let needle =
      self.search.trim().to_lowercase();
    if needle.is_empty() {
      return true;
    }
    task
      .title
      .to_lowercase()
      .contains(&needle)
      || task
        .description
        .to_lowercase()
        .contains(&needle)
  }

  fn matches_category(
    &self,
    task: &Task,
    categories: &[Category]
  ) -> bool {
    match &self.category {
      | CategoryMatch::All => true,
      | CategoryMatch::Id(id) => {
        task.category.as_deref()
          == Some(id.as_str())
      }
      | CategoryMatch::Uncategorized => {
        task.category.as_deref().is_none_or(
          |id| {
            categories
              .iter()
              .all(|c| c.id != id)
          }
        )
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::*;
  use crate::task::TaskDraft;

  fn task(
    id: &str,
    title: &str,
    description: &str,
    category: Option<&str>
  ) -> Task {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .single()
      .expect("valid timestamp");
    Task::from_draft(
      id.to_string(),
      TaskDraft {
        title: title.to_string(),
        description: description
          .to_string(),
        category: category
          .map(str::to_string),
        ..TaskDraft::default()
      },
      now
    )
  }

  fn no_lookup(
    token: &str
  ) -> anyhow::Result<String> {
    Ok(token.to_string())
  }

  #[test]
  fn search_is_case_insensitive_over_title_and_description()
   {
    let categories = Category::defaults(
      Utc::now()
    );
    let a = task(
      "a",
      "Write REPORT",
      "",
      None
    );
    let b = task(
      "b",
      "Groceries",
      "milk, eggs, report card",
      None
    );
    let c =
      task("c", "Gym", "legs", None);

    let filter = TaskFilter {
      search: "Report".to_string(),
      ..TaskFilter::default()
    };
    assert!(filter.matches(&a, &categories));
    assert!(filter.matches(&b, &categories));
    assert!(!filter.matches(&c, &categories));
  }

  #[test]
  fn uncategorized_covers_dangling_references()
   {
    let categories = Category::defaults(
      Utc::now()
    );
    let filed =
      task("a", "x", "", Some("1"));
    let loose = task("b", "y", "", None);
    let dangling =
      task("c", "z", "", Some("999"));

    let filter = TaskFilter {
      category:
        CategoryMatch::Uncategorized,
      ..TaskFilter::default()
    };
    assert!(
      !filter.matches(&filed, &categories)
    );
    assert!(
      filter.matches(&loose, &categories)
    );
    assert!(
      filter
        .matches(&dangling, &categories)
    );
  }

  #[test]
  fn terms_split_into_predicates_and_search()
   {
    let terms = [
      "status:in-progress",
      "pri:high",
      "quarterly",
      "cat:Work",
      "numbers"
    ]
    .map(str::to_string);

    let filter = TaskFilter::from_terms(
      &terms, no_lookup
    )
    .expect("parse terms");

    assert_eq!(
      filter.status,
      Match::Only(Status::InProgress)
    );
    assert_eq!(
      filter.priority,
      Match::Only(Priority::High)
    );
    assert_eq!(
      filter.category,
      CategoryMatch::Id(
        "Work".to_string()
      )
    );
    assert_eq!(
      filter.search,
      "quarterly numbers"
    );
  }

  #[test]
  fn wildcard_terms_reset_to_all() {
    let terms = [
      "status:all",
      "priority:ALL",
      "category:all"
    ]
    .map(str::to_string);
    let filter = TaskFilter::from_terms(
      &terms, no_lookup
    )
    .expect("parse terms");
    assert!(filter.is_wildcard());
  }

  #[test]
  fn unknown_status_is_rejected() {
    let terms =
      ["status:blocked".to_string()];
    assert!(
      TaskFilter::from_terms(
        &terms, no_lookup
      )
      .is_err()
    );
  }
}
