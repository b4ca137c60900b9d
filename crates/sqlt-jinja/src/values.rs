//! Conversions between JSON request data and template values

use crate::datetime::{DateTimeValue, DateValue, DeltaValue};
use crate::modules::UuidValue;
use crate::proxy::{HelperNamespace, SafeProxy};
use indexmap::IndexMap;
use minijinja::value::{Enumerator, Object, ObjectRepr, Value, ValueKind};
use serde_json::Value as Json;
use std::cell::Cell;
use std::sync::Arc;

thread_local! {
    static HIDDEN_KEY_READ: Cell<bool> = const { Cell::new(false) };
}

/// A string-keyed map whose `_`-prefixed keys templates cannot read.
///
/// Looking such a key up yields nothing and flags the current thread; the
/// processor turns the flag into a private-attribute violation once the
/// render returns. Enumeration skips hidden keys.
#[derive(Debug, Default)]
pub(crate) struct DataMap(IndexMap<String, Value>);

impl DataMap {
    pub(crate) fn into_value(self) -> Value {
        Value::from_object(self)
    }
}

impl FromIterator<(String, Value)> for DataMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        DataMap(iter.into_iter().collect())
    }
}

impl Object for DataMap {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let name = key.as_str()?;
        if name.starts_with('_') {
            HIDDEN_KEY_READ.with(|flag| flag.set(true));
            return None;
        }
        self.0.get(name).cloned()
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let keys: Vec<Value> = self
            .0
            .keys()
            .filter(|k| !k.starts_with('_'))
            .map(|k| Value::from(k.as_str()))
            .collect();
        Enumerator::Values(keys)
    }
}

/// Clear the hidden-key flag, returning whether it was set.
pub(crate) fn take_hidden_key_read() -> bool {
    HIDDEN_KEY_READ.with(|flag| flag.replace(false))
}

/// Rebuild maps (also inside sequences) as [`DataMap`]s.
///
/// Helpers, helper namespaces and data objects pass through untouched.
/// Callers validate first, so nesting is bounded.
pub(crate) fn guard_value(value: Value) -> Value {
    let opaque = value.downcast_object_ref::<DataMap>().is_some()
        || value.downcast_object_ref::<SafeProxy>().is_some()
        || value.downcast_object_ref::<HelperNamespace>().is_some()
        || is_data_object(&value);
    if opaque {
        return value;
    }
    match value.kind() {
        ValueKind::Map => {
            let Ok(keys) = value.try_iter() else {
                return value;
            };
            keys.filter_map(|key| {
                let item = value.get_item(&key).ok()?;
                let name = key.as_str().map(str::to_string).unwrap_or_else(|| key.to_string());
                Some((name, guard_value(item)))
            })
            .collect::<DataMap>()
            .into_value()
        }
        ValueKind::Seq => match value.try_iter() {
            Ok(items) => items.map(guard_value).collect(),
            Err(_) => value,
        },
        _ => value,
    }
}

/// Request JSON as a template value
pub(crate) fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::from(()),
        Json::Bool(b) => Value::from(*b),
        Json::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::from(i),
            (None, Some(f)) => Value::from(f),
            (None, None) => Value::from(n.to_string()),
        },
        Json::String(s) => Value::from(s.as_str()),
        Json::Array(items) => items.iter().map(json_to_value).collect(),
        Json::Object(obj) => obj
            .iter()
            .map(|(k, v)| (k.clone(), json_to_value(v)))
            .collect::<DataMap>()
            .into_value(),
    }
}

/// A template value as JSON, for cache contributions and helper arguments.
///
/// Data objects (dates, deltas, UUIDs) become their rendered string so
/// they can be mixed into a cache key.
pub(crate) fn value_to_json(val: &Value) -> Json {
    match val.kind() {
        ValueKind::Undefined | ValueKind::None => Json::Null,
        ValueKind::Bool => Json::Bool(val.is_true()),
        ValueKind::Number => number_to_json(val),
        ValueKind::String => Json::String(val.as_str().unwrap_or_default().to_string()),
        ValueKind::Seq | ValueKind::Iterable => match val.try_iter() {
            Ok(iter) => iter.map(|v| value_to_json(&v)).collect(),
            Err(_) => Json::Array(Vec::new()),
        },
        ValueKind::Map => {
            let entries = val.try_iter().into_iter().flatten().filter_map(|key| {
                let item = val.get_item(&key).ok()?;
                let name = key.as_str().map(str::to_string).unwrap_or_else(|| key.to_string());
                Some((name, value_to_json(&item)))
            });
            Json::Object(entries.collect())
        }
        _ => Json::String(val.to_string()),
    }
}

fn number_to_json(val: &Value) -> Json {
    if let Ok(i) = i64::try_from(val.clone()) {
        return Json::from(i);
    }
    f64::try_from(val.clone())
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map_or(Json::Null, Json::Number)
}

/// Render a value the way it appears in SQL text, `None` for null.
pub(crate) fn value_to_text(val: &Value) -> Option<String> {
    match val.kind() {
        ValueKind::Undefined | ValueKind::None => None,
        _ => Some(match val.as_str() {
            Some(s) => s.to_string(),
            None => val.to_string(),
        }),
    }
}

/// Whether `value` is one of the inert data objects helpers may receive.
pub(crate) fn is_data_object(value: &Value) -> bool {
    value.downcast_object_ref::<DateTimeValue>().is_some()
        || value.downcast_object_ref::<DateValue>().is_some()
        || value.downcast_object_ref::<DeltaValue>().is_some()
        || value.downcast_object_ref::<UuidValue>().is_some()
}
