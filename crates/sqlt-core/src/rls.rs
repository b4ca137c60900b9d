//! Row-level-security filter composition.
//!
//! Which filters apply to a user is decided by the security layer; this
//! module only combines the applicable clauses into predicates and derives
//! their cache-key contribution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An RLS filter that applies to the current user and table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLevelFilter {
    pub id: i64,
    /// SQL predicate, possibly containing template expressions
    pub clause: String,
    /// Filters sharing a group key are ORed together
    #[serde(default)]
    pub group_key: Option<String>,
}

impl RowLevelFilter {
    pub fn new(id: i64, clause: impl Into<String>) -> Self {
        Self {
            id,
            clause: clause.into(),
            group_key: None,
        }
    }

    pub fn with_group_key(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }
}

/// Combine `(group_key, clause)` pairs into predicates to be ANDed.
///
/// Ungrouped clauses are kept individually; clauses sharing a group key
/// become one parenthesised OR. Groups appear in first-seen order after the
/// ungrouped clauses.
pub fn compose_predicates<'a>(
    clauses: impl IntoIterator<Item = (Option<&'a str>, &'a str)>,
) -> Vec<String> {
    let mut ungrouped: Vec<String> = Vec::new();
    let mut group_order: Vec<&str> = Vec::new();
    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for (group_key, clause) in clauses {
        let wrapped = format!("({clause})");
        match group_key.filter(|k| !k.is_empty()) {
            Some(key) => {
                if !groups.contains_key(key) {
                    group_order.push(key);
                }
                groups.entry(key).or_default().push(wrapped);
            }
            None => ungrouped.push(wrapped),
        }
    }

    let mut result = ungrouped;
    for key in group_order {
        let members = groups.remove(key).unwrap_or_default();
        if members.len() == 1 {
            result.extend(members);
        } else {
            result.push(format!("({})", members.join(" OR ")));
        }
    }
    result
}

/// Cache-key contribution of a set of RLS filters, independent of order.
pub fn rls_cache_key(filters: &[RowLevelFilter]) -> Vec<String> {
    let mut sorted: Vec<&RowLevelFilter> = filters.iter().collect();
    sorted.sort_by_key(|f| f.id);
    sorted
        .into_iter()
        .map(|f| {
            format!(
                "{}-{}-{}",
                f.id,
                f.group_key.as_deref().unwrap_or_default(),
                f.clause
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ungrouped_clauses_stay_separate() {
        let result = compose_predicates([(None, "a = 1"), (None, "b = 2")]);
        assert_eq!(result, vec!["(a = 1)", "(b = 2)"]);
    }

    #[test]
    fn test_grouped_clauses_are_ored() {
        let result = compose_predicates([
            (Some("region"), "region = 'emea'"),
            (None, "active"),
            (Some("region"), "region = 'apac'"),
            (Some("team"), "team_id = 4"),
        ]);
        assert_eq!(
            result,
            vec![
                "(active)",
                "((region = 'emea') OR (region = 'apac'))",
                "(team_id = 4)",
            ]
        );
    }

    #[test]
    fn test_empty_group_key_is_ungrouped() {
        let result = compose_predicates([(Some(""), "x"), (Some(""), "y")]);
        assert_eq!(result, vec!["(x)", "(y)"]);
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = RowLevelFilter::new(2, "b = 1").with_group_key("g");
        let b = RowLevelFilter::new(1, "a = 1");
        assert_eq!(
            rls_cache_key(&[a.clone(), b.clone()]),
            rls_cache_key(&[b, a])
        );
    }

    #[test]
    fn test_cache_key_format() {
        let key = rls_cache_key(&[RowLevelFilter::new(3, "x = 1").with_group_key("g")]);
        assert_eq!(key, vec!["3-g-x = 1"]);
    }
}
