//! Chart form data as posted with a request, and the filter merging rules
//! that produce the effective filter list templates see.
//!
//! Nothing here mutates the request payload: merging builds a new list.

use crate::error::{CoreError, CoreResult};
use crate::filter::{FilterDescriptor, FilterOperator};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Extra-filter pseudo-columns that carry time options instead of filters.
const TIME_EXTRA_COLUMNS: &[&str] = &["__time_range", "__time_col", "__time_grain"];

/// Deserialize `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The subset of a chart's `form_data` the template helpers read.
///
/// Unknown keys are preserved in [`FormData::other`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub url_params: BTreeMap<String, serde_json::Value>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub adhoc_filters: Vec<AdhocFilter>,

    /// Legacy dashboard filters (`{col, op, val}`)
    #[serde(default, deserialize_with = "null_as_default")]
    pub extra_filters: Vec<ExtraFilter>,

    /// Legacy simple filters, converted to adhoc when no adhoc filters exist
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Vec<ExtraFilter>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub extra_form_data: ExtraFormData,

    #[serde(default)]
    pub slice_id: Option<i64>,

    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Native-filter payload appended to the chart's own filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraFormData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Vec<ExtraFilter>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub adhoc_filters: Vec<AdhocFilter>,
}

/// A filter authored in the explore UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdhocFilter {
    #[serde(default)]
    pub clause: Option<String>,

    #[serde(default)]
    pub comparator: serde_json::Value,

    #[serde(default, rename = "expressionType")]
    pub expression_type: Option<String>,

    #[serde(default)]
    pub operator: Option<String>,

    /// Column name, or an adhoc column object
    #[serde(default)]
    pub subject: serde_json::Value,

    #[serde(default, rename = "sqlExpression", skip_serializing_if = "Option::is_none")]
    pub sql_expression: Option<String>,

    #[serde(default, rename = "isExtra", skip_serializing_if = "std::ops::Not::not")]
    pub is_extra: bool,
}

/// A legacy simple filter: `{col, op, val}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraFilter {
    #[serde(default)]
    pub col: String,

    #[serde(default)]
    pub op: String,

    #[serde(default)]
    pub val: serde_json::Value,
}

impl AdhocFilter {
    /// Build a `SIMPLE` adhoc filter from a legacy `{col, op, val}` filter.
    pub fn from_simple(filter: &ExtraFilter, clause: &str, is_extra: bool) -> Self {
        Self {
            clause: Some(clause.to_ascii_uppercase()),
            comparator: filter.val.clone(),
            expression_type: Some("SIMPLE".to_string()),
            operator: Some(filter.op.clone()),
            subject: serde_json::Value::String(filter.col.clone()),
            sql_expression: None,
            is_extra,
        }
    }

    /// The column name this filter targets, when it is a plain column.
    pub fn subject_name(&self) -> Option<&str> {
        match &self.subject {
            serde_json::Value::String(s) => Some(s.as_str()),
            serde_json::Value::Object(obj) => obj.get("label").and_then(|l| l.as_str()),
            _ => None,
        }
    }

    /// Filters without an `expressionType` are treated as `SIMPLE`.
    fn is_simple(&self) -> bool {
        self.expression_type
            .as_deref()
            .map_or(true, |t| t.eq_ignore_ascii_case("SIMPLE"))
    }

    fn is_where(&self) -> bool {
        self.clause
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case("WHERE"))
            .unwrap_or(false)
    }

    fn merge_key(&self) -> Option<String> {
        let subject = self.subject_name()?;
        Some(format!("{}__{}", subject, self.operator.as_deref().unwrap_or_default()))
    }
}

impl FormData {
    /// Parse a `form_data` JSON payload.
    pub fn from_json(raw: &str) -> CoreResult<Self> {
        serde_json::from_str(raw).map_err(invalid_form_data)
    }

    /// Read form data already decoded as JSON (a string is parsed first).
    pub fn from_value(value: &serde_json::Value) -> CoreResult<Self> {
        match value {
            serde_json::Value::String(raw) => Self::from_json(raw),
            other => serde_json::from_value(other.clone()).map_err(invalid_form_data),
        }
    }

    /// Overlay `other` onto `self`: keys present in `other` win.
    pub fn merge(self, other: FormData) -> FormData {
        let mut url_params = self.url_params;
        url_params.extend(other.url_params);
        let mut rest = self.other;
        rest.extend(other.other);
        FormData {
            url_params,
            adhoc_filters: if other.adhoc_filters.is_empty() {
                self.adhoc_filters
            } else {
                other.adhoc_filters
            },
            extra_filters: if other.extra_filters.is_empty() {
                self.extra_filters
            } else {
                other.extra_filters
            },
            filters: if other.filters.is_empty() {
                self.filters
            } else {
                other.filters
            },
            extra_form_data: if other.extra_form_data == ExtraFormData::default() {
                self.extra_form_data
            } else {
                other.extra_form_data
            },
            slice_id: other.slice_id.or(self.slice_id),
            other: rest,
        }
    }

    /// The chart id from `slice_id`, falling back to `url_params.slice_id`.
    pub fn chart_id(&self) -> Option<i64> {
        self.slice_id
            .or_else(|| self.url_params.get("slice_id").and_then(json_as_i64))
    }

    /// The dataset id from `url_params.datasource_id`.
    pub fn url_datasource_id(&self) -> Option<i64> {
        self.url_params.get("datasource_id").and_then(json_as_i64)
    }

    /// Every adhoc filter in effect for this request.
    ///
    /// Legacy `filters` are used only when no adhoc filters exist; native
    /// filter extras are appended; legacy `extra_filters` are merged unless
    /// an identical filter is already present or the entry is a time option.
    pub fn effective_filters(&self) -> Vec<AdhocFilter> {
        let mut adhoc: Vec<AdhocFilter> = if self.adhoc_filters.is_empty() {
            self.filters
                .iter()
                .map(|f| AdhocFilter::from_simple(f, "where", false))
                .collect()
        } else {
            self.adhoc_filters.clone()
        };

        adhoc.extend(self.extra_form_data.adhoc_filters.iter().map(|f| AdhocFilter {
            is_extra: true,
            ..f.clone()
        }));
        adhoc.extend(
            self.extra_form_data
                .filters
                .iter()
                .map(|f| AdhocFilter::from_simple(f, "where", true)),
        );

        let existing: BTreeMap<String, serde_json::Value> = adhoc
            .iter()
            .filter(|f| f.is_simple() && !f.comparator.is_null())
            .filter_map(|f| f.merge_key().map(|k| (k, f.comparator.clone())))
            .collect();

        for extra in &self.extra_filters {
            if TIME_EXTRA_COLUMNS.contains(&extra.col.as_str()) || !json_truthy(&extra.val) {
                continue;
            }
            let key = format!("{}__{}", extra.col, extra.op);
            let duplicate = match existing.get(&key) {
                Some(current) => same_comparator(current, &extra.val),
                None => false,
            };
            if !duplicate {
                adhoc.push(AdhocFilter::from_simple(extra, "where", true));
            }
        }

        adhoc
    }

    /// Filters targeting `column`, as `{op, col, val}` descriptors.
    ///
    /// Only `SIMPLE` `WHERE` filters with a non-empty comparator count (an
    /// explicit `SQL` expression filter never matches). List
    /// operators always carry a list comparator.
    pub fn filters_for(&self, column: &str) -> Vec<FilterDescriptor> {
        self.effective_filters()
            .into_iter()
            .filter(|f| {
                f.is_simple()
                    && f.is_where()
                    && f.subject_name() == Some(column)
                    && json_truthy(&f.comparator)
            })
            .map(|f| {
                let op = FilterOperator::parse(f.operator.as_deref().unwrap_or_default());
                let val = match f.comparator {
                    serde_json::Value::Array(items) => serde_json::Value::Array(items),
                    other if op.is_list_operator() => serde_json::Value::Array(vec![other]),
                    other => other,
                };
                FilterDescriptor {
                    op,
                    col: column.to_string(),
                    val,
                }
            })
            .collect()
    }
}

/// List comparators compare as sets, scalars compare by value.
fn same_comparator(current: &serde_json::Value, incoming: &serde_json::Value) -> bool {
    match (current, incoming) {
        (serde_json::Value::Array(a), serde_json::Value::Array(b)) => {
            let a: BTreeSet<String> = a.iter().map(|v| v.to_string()).collect();
            let b: BTreeSet<String> = b.iter().map(|v| v.to_string()).collect();
            a == b
        }
        (serde_json::Value::Array(_), _) | (_, serde_json::Value::Array(_)) => false,
        (a, b) => a == b,
    }
}

fn invalid_form_data(err: serde_json::Error) -> CoreError {
    CoreError::InvalidFormData {
        message: err.to_string(),
    }
}

fn json_as_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Truthiness as the form-data producers use it: empty and zero are false.
pub fn json_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
#[path = "form_data_test.rs"]
mod tests;
