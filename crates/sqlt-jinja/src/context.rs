//! Standard context helpers: `url_param`, `filter_values`, `get_filters`,
//! the `current_user_*` family and `cache_key_wrapper`.
//!
//! [`ExtraCache`] implements the helpers over the render's [`RenderInputs`]
//! and records their side effects in the shared [`ExtraCacheState`]. The
//! `make_*_fn` factories adapt each helper to a template function; the
//! namespace wraps them in safe proxies.

use crate::extra_cache::{lock_state, ExtraCacheSnapshot, ExtraCacheState, SharedCacheState};
use crate::values::{json_to_value, value_to_json};
use minijinja::value::{Kwargs, Value};
use minijinja::Error;
use serde_json::json;
use sqlt_core::{FilterDescriptor, FilterOperator, RenderInputs, SqlDialect};
use std::sync::{Arc, Mutex};

/// Where `current_user_locale()` falls back to
#[derive(Debug, Clone)]
pub struct LocaleSettings {
    pub default_locale: String,
    /// Locales accepted from Accept-Language; empty accepts any
    pub supported: Vec<String>,
}

impl Default for LocaleSettings {
    fn default() -> Self {
        Self {
            default_locale: "en".to_string(),
            supported: Vec::new(),
        }
    }
}

/// Request-backed helpers bound to one render's state
#[derive(Debug, Clone)]
pub struct ExtraCache {
    inputs: Arc<RenderInputs>,
    state: SharedCacheState,
    locale: Arc<LocaleSettings>,
}

impl ExtraCache {
    pub fn new(inputs: Arc<RenderInputs>, dialect: Option<SqlDialect>, locale: Arc<LocaleSettings>) -> Self {
        Self {
            inputs,
            state: Arc::new(Mutex::new(ExtraCacheState::new(dialect))),
            locale,
        }
    }

    /// Read a URL parameter from the query string, then from
    /// `form_data.url_params`.
    ///
    /// String results, `default` included, are literal-escaped for the
    /// active dialect unless `escape_result` is false. The result (even
    /// `None`) is a cache contribution unless `add_to_cache_keys` is false.
    pub fn url_param(
        &self,
        param: &str,
        default: Option<serde_json::Value>,
        add_to_cache_keys: bool,
        escape_result: bool,
    ) -> Option<serde_json::Value> {
        let found = self.inputs.url_param(param).found("url_param");
        let mut result = found.or(default).filter(|v| !v.is_null());

        if escape_result {
            if let (Some(dialect), Some(serde_json::Value::String(s))) = (self.dialect(), &result) {
                result = Some(serde_json::Value::String(dialect.escape_literal(s)));
            }
        }
        if add_to_cache_keys {
            self.cache_key_wrapper(result.clone().unwrap_or(serde_json::Value::Null));
        }
        result
    }

    /// Filter descriptors for `column`.
    ///
    /// The column is recorded as applied when a filter matched, and also as
    /// removed when `remove_filter` is set. The matched descriptors are a
    /// cache contribution, since they flow into the rendered SQL.
    pub fn get_filters(&self, column: &str, remove_filter: bool) -> Vec<FilterDescriptor> {
        let filters = self
            .inputs
            .form_data()
            .found("get_filters")
            .map(|fd| fd.filters_for(column))
            .unwrap_or_default();

        if !filters.is_empty() {
            let mut state = lock_state(&self.state);
            if remove_filter {
                state.note_removed_filter(column);
            } else {
                state.note_applied_filter(column);
            }
            state.note_cache_contribution(filters_contribution(column, &filters));
        }
        filters
    }

    /// Flat list of the values of `IN` and `==` filters on `column`.
    ///
    /// Falls back to `[default]` when nothing matched and a default is
    /// given. Comparators keep their JSON type.
    pub fn filter_values(
        &self,
        column: &str,
        default: Option<serde_json::Value>,
        remove_filter: bool,
    ) -> Vec<serde_json::Value> {
        let mut values = Vec::new();
        for filter in self.get_filters(column, remove_filter) {
            if !matches!(filter.op, FilterOperator::In | FilterOperator::Equals) {
                continue;
            }
            match filter.val {
                serde_json::Value::Array(items) => values.extend(items),
                serde_json::Value::Null => {}
                other => values.push(other),
            }
        }
        match default {
            Some(default) if values.is_empty() && !default.is_null() => vec![default],
            _ => values,
        }
    }

    fn contribute_if<T: Clone + Into<serde_json::Value>>(&self, value: Option<T>, add: bool) -> Option<T> {
        if add {
            if let Some(v) = &value {
                self.cache_key_wrapper(v.clone().into());
            }
        }
        value
    }

    pub fn current_user_id(&self, add_to_cache_keys: bool) -> Option<i64> {
        let id = self.inputs.user().and_then(|u| u.id);
        self.contribute_if(id, add_to_cache_keys)
    }

    pub fn current_username(&self, add_to_cache_keys: bool) -> Option<String> {
        let name = self.inputs.user().and_then(|u| u.username.clone());
        self.contribute_if(name, add_to_cache_keys)
    }

    pub fn current_user_email(&self, add_to_cache_keys: bool) -> Option<String> {
        let email = self.inputs.user().and_then(|u| u.email.clone());
        self.contribute_if(email, add_to_cache_keys)
    }

    /// The user's role names, sorted; `None` when the user has none.
    pub fn current_user_roles(&self, add_to_cache_keys: bool) -> Option<Vec<String>> {
        let mut roles = self.inputs.user().map(|u| u.roles.clone()).unwrap_or_default();
        if roles.is_empty() {
            return None;
        }
        roles.sort();
        self.contribute_if(Some(roles), add_to_cache_keys)
    }

    /// RLS clauses that apply to the user, sorted. Always a cache
    /// contribution when present.
    pub fn current_user_rls_rules(&self) -> Option<Vec<String>> {
        let mut rules = self.inputs.rls_rules().to_vec();
        if rules.is_empty() {
            return None;
        }
        rules.sort();
        self.contribute_if(Some(rules), true)
    }

    /// Session locale, then Accept-Language, then the configured default.
    pub fn current_user_locale(&self, add_to_cache_keys: bool) -> String {
        let locale = self
            .inputs
            .resolve_locale(&self.locale.supported, &self.locale.default_locale);
        if add_to_cache_keys {
            self.cache_key_wrapper(serde_json::Value::String(locale.clone()));
        }
        locale
    }

    /// Record `value` as a cache contribution and hand it back.
    pub fn cache_key_wrapper(&self, value: serde_json::Value) -> serde_json::Value {
        lock_state(&self.state).note_cache_contribution(value.clone());
        value
    }

    pub fn dialect(&self) -> Option<SqlDialect> {
        lock_state(&self.state).dialect()
    }

    pub fn inputs(&self) -> &RenderInputs {
        &self.inputs
    }

    pub fn snapshot(&self) -> ExtraCacheSnapshot {
        lock_state(&self.state).snapshot()
    }
}

/// `{"filter": column, "values": [{op, col, val}, ...]}`
fn filters_contribution(column: &str, filters: &[FilterDescriptor]) -> serde_json::Value {
    let values: Vec<serde_json::Value> = filters
        .iter()
        .map(|f| json!({"op": f.op.as_str(), "col": f.col, "val": f.val}))
        .collect();
    json!({"filter": column, "values": values})
}

/// Read an optional argument given positionally or by keyword.
fn optional<'a, T>(positional: Option<T>, kwargs: &'a Kwargs, name: &'a str) -> Result<Option<T>, Error>
where
    T: minijinja::value::ArgType<'a, Output = T>,
{
    match positional {
        Some(v) => Ok(Some(v)),
        None => kwargs.get::<Option<T>>(name),
    }
}

fn json_arg(value: Option<Value>) -> Option<serde_json::Value> {
    value.map(|v| value_to_json(&v)).filter(|v| !v.is_null())
}

fn option_to_value<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::from(()))
}

/// Create the url_param() function
///
/// Usage in templates:
/// ```jinja
/// WHERE name = '{{ url_param("name", "default", escape_result=True) }}'
/// ```
pub(crate) fn make_url_param_fn(
    cache: ExtraCache,
) -> impl Fn(&str, Option<Value>, Option<bool>, Option<bool>, Kwargs) -> Result<Value, Error>
       + Send
       + Sync
       + Clone
       + 'static {
    move |param: &str,
          default: Option<Value>,
          add_to_cache_keys: Option<bool>,
          escape_result: Option<bool>,
          kwargs: Kwargs| {
        let default = optional(default, &kwargs, "default")?;
        let add = optional(add_to_cache_keys, &kwargs, "add_to_cache_keys")?.unwrap_or(true);
        let escape = optional(escape_result, &kwargs, "escape_result")?.unwrap_or(true);
        kwargs.assert_all_used()?;
        let result = cache.url_param(param, json_arg(default), add, escape);
        Ok(result.as_ref().map(json_to_value).unwrap_or(Value::from(())))
    }
}

/// Create the filter_values() function
///
/// Usage in templates:
/// ```jinja
/// WHERE country IN ({{ filter_values("country") | where_in }})
/// ```
pub(crate) fn make_filter_values_fn(
    cache: ExtraCache,
) -> impl Fn(&str, Option<Value>, Option<bool>, Kwargs) -> Result<Value, Error>
       + Send
       + Sync
       + Clone
       + 'static {
    move |column: &str, default: Option<Value>, remove_filter: Option<bool>, kwargs: Kwargs| {
        let default = optional(default, &kwargs, "default")?;
        let remove = optional(remove_filter, &kwargs, "remove_filter")?.unwrap_or(false);
        kwargs.assert_all_used()?;
        let values = cache.filter_values(column, json_arg(default), remove);
        Ok(json_to_value(&serde_json::Value::Array(values)))
    }
}

/// Create the get_filters() function
///
/// Usage in templates:
/// ```jinja
/// {% for f in get_filters("country", remove_filter=True) %}
///   AND country {{ f.op }} ({{ f.val | where_in }})
/// {% endfor %}
/// ```
pub(crate) fn make_get_filters_fn(
    cache: ExtraCache,
) -> impl Fn(&str, Option<bool>, Kwargs) -> Result<Value, Error> + Send + Sync + Clone + 'static {
    move |column: &str, remove_filter: Option<bool>, kwargs: Kwargs| {
        let remove = optional(remove_filter, &kwargs, "remove_filter")?.unwrap_or(false);
        kwargs.assert_all_used()?;
        let filters = cache.get_filters(column, remove);
        let json = serde_json::to_value(&filters).map_err(|e| {
            Error::new(
                minijinja::ErrorKind::InvalidOperation,
                format!("failed to serialize filters: {e}"),
            )
        })?;
        Ok(json_to_value(&json))
    }
}

/// Which `current_user_*` helper a factory builds
#[derive(Debug, Clone, Copy)]
pub(crate) enum UserField {
    Id,
    Username,
    Email,
    Roles,
}

/// Create one of the current_user_id() / current_username() /
/// current_user_email() / current_user_roles() functions
pub(crate) fn make_current_user_fn(
    cache: ExtraCache,
    field: UserField,
) -> impl Fn(Option<bool>, Kwargs) -> Result<Value, Error> + Send + Sync + Clone + 'static {
    move |add_to_cache_keys: Option<bool>, kwargs: Kwargs| {
        let add = optional(add_to_cache_keys, &kwargs, "add_to_cache_keys")?.unwrap_or(true);
        kwargs.assert_all_used()?;
        Ok(match field {
            UserField::Id => option_to_value(cache.current_user_id(add)),
            UserField::Username => option_to_value(cache.current_username(add)),
            UserField::Email => option_to_value(cache.current_user_email(add)),
            UserField::Roles => option_to_value(
                cache
                    .current_user_roles(add)
                    .map(|roles| roles.into_iter().map(Value::from).collect::<Vec<_>>()),
            ),
        })
    }
}

/// Create the current_user_rls_rules() function
pub(crate) fn make_current_user_rls_rules_fn(
    cache: ExtraCache,
) -> impl Fn() -> Value + Send + Sync + Clone + 'static {
    move || {
        option_to_value(
            cache
                .current_user_rls_rules()
                .map(|rules| rules.into_iter().map(Value::from).collect::<Vec<_>>()),
        )
    }
}

/// Create the current_user_locale() function
///
/// Usage in templates:
/// ```jinja
/// -- locale: {{ current_user_locale(add_to_cache_keys=False) }}
/// ```
pub(crate) fn make_current_user_locale_fn(
    cache: ExtraCache,
) -> impl Fn(Option<bool>, Kwargs) -> Result<String, Error> + Send + Sync + Clone + 'static {
    move |add_to_cache_keys: Option<bool>, kwargs: Kwargs| {
        let add = optional(add_to_cache_keys, &kwargs, "add_to_cache_keys")?.unwrap_or(true);
        kwargs.assert_all_used()?;
        Ok(cache.current_user_locale(add))
    }
}

/// Create the cache_key_wrapper() function
///
/// The argument is returned untouched; its JSON form is the contribution.
pub(crate) fn make_cache_key_wrapper_fn(
    cache: ExtraCache,
) -> impl Fn(Value) -> Value + Send + Sync + Clone + 'static {
    move |value: Value| {
        cache.cache_key_wrapper(value_to_json(&value));
        value
    }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
