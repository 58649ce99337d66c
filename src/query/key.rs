//! Semantic query keys.

use std::fmt;

/// Ordered tuple of segments identifying one cached query.
///
/// Every filter parameter must be part of the key: two keys are the same cache
/// entry exactly when all their segments match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
  pub fn new(root: impl Into<String>) -> Self {
    Self(vec![root.into()])
  }

  /// Append a segment.
  pub fn with(mut self, segment: impl ToString) -> Self {
    self.0.push(segment.to_string());
    self
  }

  /// Append `name=value`, or `name=*` when the filter is unset.
  ///
  /// The marker keeps an unfiltered key distinct from every filtered one.
  pub fn with_filter<V: ToString>(mut self, name: &str, value: Option<V>) -> Self {
    let value = value
      .map(|v| v.to_string())
      .unwrap_or_else(|| "*".to_string());
    self.0.push(format!("{}={}", name, value));
    self
  }

  pub fn segments(&self) -> &[String] {
    &self.0
  }

  /// True if `prefix` matches the leading segments of this key.
  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.0.starts_with(&prefix.0)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", self.0.join(", "))
  }
}

impl<S: Into<String>> FromIterator<S> for QueryKey {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self(iter.into_iter().map(Into::into).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_prefix_matching() {
    let key = QueryKey::new("jobs").with("user-1").with_filter("status", Some("SCHEDULED"));
    assert!(key.starts_with(&QueryKey::new("jobs")));
    assert!(key.starts_with(&QueryKey::new("jobs").with("user-1")));
    assert!(!key.starts_with(&QueryKey::new("jobs").with("user-2")));
    assert!(!key.starts_with(&QueryKey::new("clients")));
  }

  #[test]
  fn test_filters_are_part_of_identity() {
    let all = QueryKey::new("jobs").with("u").with_filter::<&str>("status", None);
    let scheduled = QueryKey::new("jobs").with("u").with_filter("status", Some("SCHEDULED"));
    assert_ne!(all, scheduled);
    assert_eq!(all.to_string(), "[jobs, u, status=*]");
  }

  #[test]
  fn test_collect_from_segments() {
    let key: QueryKey = ["dashboard-stats", "biz-1"].into_iter().collect();
    assert_eq!(key.segments(), &["dashboard-stats".to_string(), "biz-1".to_string()]);
  }
}
