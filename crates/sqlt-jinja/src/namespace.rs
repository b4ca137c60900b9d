//! Layered template namespace.
//!
//! A render sees the names of four layers, later layers replacing earlier
//! names: the base layer (standard helpers and modules), installer addons,
//! backend helpers and per-render bindings.

use crate::context::{
    make_cache_key_wrapper_fn, make_current_user_fn, make_current_user_locale_fn,
    make_current_user_rls_rules_fn, make_filter_values_fn, make_get_filters_fn,
    make_url_param_fn, ExtraCache, UserField,
};
use crate::datetime::{datetime_namespace, relativedelta_fn, timedelta_fn};
use crate::modules::{random_namespace, time_namespace, uuid3_fn, uuid4_fn, uuid5_fn, uuid_namespace};
use crate::error::SandboxViolation;
use crate::proxy::{validate_value, SafeProxy};
use crate::values::{guard_value, json_to_value};
use indexmap::IndexMap;
use minijinja::value::Value;
use std::fmt;

/// Where a namespace entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Base,
    Addons,
    Backend,
    Bindings,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Base => "base",
            Layer::Addons => "addons",
            Layer::Backend => "backend",
            Layer::Bindings => "bindings",
        };
        f.write_str(name)
    }
}

/// Ordered identifiers visible to one render
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: IndexMap<String, (Layer, Value)>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `entries` as `layer`, replacing names defined by earlier layers.
    pub fn push_layer(&mut self, layer: Layer, entries: impl IntoIterator<Item = (String, Value)>) {
        for (name, value) in entries {
            if let Some((previous, _)) = self.entries.get(&name) {
                log::debug!("Namespace: {layer} layer overrides '{name}' from {previous}");
            }
            self.entries.insert(name, (layer, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|(_, value)| value)
    }

    pub fn layer_of(&self, name: &str) -> Option<Layer> {
        self.entries.get(name).map(|(layer, _)| *layer)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, (_, v))| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-render keyword bindings.
///
/// Bindings are data; a raw callable among them is refused when the
/// processor is built.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: IndexMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_json(self, name: impl Into<String>, value: &serde_json::Value) -> Self {
        self.with(name, json_to_value(value))
    }

    /// Bindings from a JSON object; other JSON values bind nothing.
    pub fn from_json(object: &serde_json::Value) -> Self {
        let mut bindings = Self::new();
        if let serde_json::Value::Object(map) = object {
            for (name, value) in map {
                bindings = bindings.with_json(name.clone(), value);
            }
        }
        bindings
    }

    /// Merge `other` over `self`.
    pub fn merged(mut self, other: Bindings) -> Self {
        self.values.extend(other.values);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Refuse bindings that carry raw callables.
    pub fn validate(&self) -> Result<(), SandboxViolation> {
        self.values.values().try_for_each(|v| validate_value(v, 0))
    }

    /// Entries with every map hiding its `_`-prefixed keys
    pub(crate) fn into_entries(self) -> impl Iterator<Item = (String, Value)> {
        self.values.into_iter().map(|(name, value)| (name, guard_value(value)))
    }
}

fn proxy(name: &str, function: Value) -> (String, Value) {
    (name.to_string(), SafeProxy::wrap(name, function))
}

/// Modules and constructors every render sees.
pub(crate) fn module_entries() -> Vec<(String, Value)> {
    vec![
        ("datetime".to_string(), datetime_namespace()),
        ("relativedelta".to_string(), relativedelta_fn()),
        ("timedelta".to_string(), timedelta_fn()),
        ("time".to_string(), time_namespace()),
        ("uuid".to_string(), uuid_namespace()),
        ("uuid3".to_string(), uuid3_fn()),
        ("uuid4".to_string(), uuid4_fn()),
        ("uuid5".to_string(), uuid5_fn()),
        ("random".to_string(), random_namespace()),
    ]
}

/// Request-backed helpers bound to `cache`.
pub(crate) fn context_entries(cache: &ExtraCache) -> Vec<(String, Value)> {
    let user = |field| Value::from_function(make_current_user_fn(cache.clone(), field));
    vec![
        proxy("url_param", Value::from_function(make_url_param_fn(cache.clone()))),
        proxy(
            "filter_values",
            Value::from_function(make_filter_values_fn(cache.clone())),
        ),
        proxy("get_filters", Value::from_function(make_get_filters_fn(cache.clone()))),
        proxy("current_user_id", user(UserField::Id)),
        proxy("current_username", user(UserField::Username)),
        proxy("current_user_email", user(UserField::Email)),
        proxy("current_user_roles", user(UserField::Roles)),
        proxy(
            "current_user_rls_rules",
            Value::from_function(make_current_user_rls_rules_fn(cache.clone())),
        ),
        proxy(
            "current_user_locale",
            Value::from_function(make_current_user_locale_fn(cache.clone())),
        ),
        proxy(
            "cache_key_wrapper",
            Value::from_function(make_cache_key_wrapper_fn(cache.clone())),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_layers_override() {
        let mut ns = Namespace::new();
        ns.push_layer(
            Layer::Base,
            vec![("a".to_string(), Value::from(1)), ("b".to_string(), Value::from(2))],
        );
        ns.push_layer(Layer::Bindings, vec![("a".to_string(), Value::from(10))]);
        assert_eq!(ns.get("a"), Some(&Value::from(10)));
        assert_eq!(ns.layer_of("a"), Some(Layer::Bindings));
        assert_eq!(ns.layer_of("b"), Some(Layer::Base));
        assert_eq!(ns.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_module_entries_are_proxies_or_namespaces() {
        for (name, value) in module_entries() {
            assert!(validate_value(&value, 0).is_ok(), "{name} is not a safe value");
        }
    }

    #[test]
    fn test_bindings_refuse_raw_callables() {
        let ok = Bindings::new().with("x", 1).with_json("y", &serde_json::json!({"a": [1]}));
        assert!(ok.validate().is_ok());
        let bad = Bindings::new().with("f", Value::from_function(|| 1));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_bindings_from_json_and_merge() {
        let a = Bindings::from_json(&serde_json::json!({"x": 1, "y": 2}));
        let b = Bindings::new().with("y", 3);
        let entries: Vec<_> = a.merged(b).into_entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], ("y".to_string(), Value::from(3)));
    }
}
