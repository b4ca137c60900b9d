//! SQL literal filters: `sqljoin` and `where_in`

use crate::values::value_to_json;
use minijinja::value::{Value, ValueKind};
use sqlt_core::SqlDialect;

const MARK_WARNING: &str =
    "\n-- WARNING: the `mark` parameter was removed from the `where_in` macro for security reasons\n";

fn literal_items(value: &Value) -> Vec<serde_json::Value> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Vec::new(),
        ValueKind::Seq | ValueKind::Iterable => match value_to_json(value) {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        },
        _ => vec![value_to_json(value)],
    }
}

/// Create the sqljoin filter
///
/// Renders a sequence as a `, `-joined list of literals quoted for
/// `dialect`.
///
/// Usage in templates:
/// ```jinja
/// WHERE name IN ({{ filter_values("name") | sqljoin }})
/// ```
pub(crate) fn make_sqljoin_filter(
    dialect: SqlDialect,
) -> impl Fn(Value) -> String + Send + Sync + Clone + 'static {
    move |value: Value| dialect.render_list(&literal_items(&value))
}

/// Create the where_in filter
///
/// Renders a sequence as a parenthesised literal list. The legacy second
/// argument is ignored and a warning comment is appended instead.
///
/// Usage in templates:
/// ```jinja
/// WHERE country IN {{ filter_values("country") | where_in }}
/// ```
pub(crate) fn make_where_in_filter(
    dialect: SqlDialect,
) -> impl Fn(Value, Option<Value>) -> String + Send + Sync + Clone + 'static {
    move |value: Value, mark: Option<Value>| {
        let list = format!("({})", dialect.render_list(&literal_items(&value)));
        match mark {
            Some(_) => {
                log::warn!("where_in called with the removed mark parameter");
                format!("{list}{MARK_WARNING}")
            }
            None => list,
        }
    }
}
