//! Filter operators and the descriptors handed to templates by `get_filters`.

use serde::Serialize;
use std::fmt;

/// Operators a request filter may carry.
///
/// The template core treats filters as data; interpreting the operator is
/// the query engine's job. Operators outside this set are kept verbatim via
/// [`FilterOperator::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEquals,
    LessThanOrEquals,
    Like,
    NotLike,
    ILike,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    IsTrue,
    IsFalse,
    Regex,
    TemporalRange,
    Other(String),
}

impl FilterOperator {
    /// Parse an operator as it appears in form data (case-insensitive).
    ///
    /// Accepts both the symbolic spelling (`==`) and the legacy string
    /// spelling (`EQUALS`).
    pub fn parse(op: &str) -> Self {
        let upper = op.trim().to_ascii_uppercase();
        match upper.as_str() {
            "==" | "=" | "EQUALS" => FilterOperator::Equals,
            "!=" | "<>" | "NOT_EQUALS" => FilterOperator::NotEquals,
            ">" | "GREATER_THAN" => FilterOperator::GreaterThan,
            "<" | "LESS_THAN" => FilterOperator::LessThan,
            ">=" | "GREATER_THAN_OR_EQUAL" => FilterOperator::GreaterThanOrEquals,
            "<=" | "LESS_THAN_OR_EQUAL" => FilterOperator::LessThanOrEquals,
            "LIKE" => FilterOperator::Like,
            "NOT LIKE" | "NOT_LIKE" => FilterOperator::NotLike,
            "ILIKE" => FilterOperator::ILike,
            "IS NULL" | "IS_NULL" => FilterOperator::IsNull,
            "IS NOT NULL" | "IS_NOT_NULL" => FilterOperator::IsNotNull,
            "IN" => FilterOperator::In,
            "NOT IN" | "NOT_IN" => FilterOperator::NotIn,
            "IS TRUE" | "IS_TRUE" => FilterOperator::IsTrue,
            "IS FALSE" | "IS_FALSE" => FilterOperator::IsFalse,
            "REGEX" => FilterOperator::Regex,
            "TEMPORAL_RANGE" => FilterOperator::TemporalRange,
            _ => FilterOperator::Other(upper),
        }
    }

    /// Canonical spelling handed to templates.
    pub fn as_str(&self) -> &str {
        match self {
            FilterOperator::Equals => "==",
            FilterOperator::NotEquals => "!=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::LessThan => "<",
            FilterOperator::GreaterThanOrEquals => ">=",
            FilterOperator::LessThanOrEquals => "<=",
            FilterOperator::Like => "LIKE",
            FilterOperator::NotLike => "NOT LIKE",
            FilterOperator::ILike => "ILIKE",
            FilterOperator::IsNull => "IS NULL",
            FilterOperator::IsNotNull => "IS NOT NULL",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT IN",
            FilterOperator::IsTrue => "IS TRUE",
            FilterOperator::IsFalse => "IS FALSE",
            FilterOperator::Regex => "REGEX",
            FilterOperator::TemporalRange => "TEMPORAL_RANGE",
            FilterOperator::Other(raw) => raw,
        }
    }

    /// Whether the comparator of this operator is always a list.
    pub fn is_list_operator(&self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::NotIn)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FilterOperator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A filter as handed to template authors: `{op, col, val}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterDescriptor {
    pub op: FilterOperator,
    pub col: String,
    pub val: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbolic_and_legacy_spellings() {
        assert_eq!(FilterOperator::parse("in"), FilterOperator::In);
        assert_eq!(FilterOperator::parse("=="), FilterOperator::Equals);
        assert_eq!(FilterOperator::parse("EQUALS"), FilterOperator::Equals);
        assert_eq!(FilterOperator::parse("not in"), FilterOperator::NotIn);
        assert_eq!(FilterOperator::parse("NOT_IN"), FilterOperator::NotIn);
    }

    #[test]
    fn test_unknown_operator_is_kept() {
        let op = FilterOperator::parse("between");
        assert_eq!(op, FilterOperator::Other("BETWEEN".to_string()));
        assert_eq!(op.as_str(), "BETWEEN");
    }

    #[test]
    fn test_descriptor_serializes_operator_as_string() {
        let desc = FilterDescriptor {
            op: FilterOperator::In,
            col: "name".to_string(),
            val: serde_json::json!(["foo"]),
        };
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json, serde_json::json!({"op": "IN", "col": "name", "val": ["foo"]}));
    }
}
