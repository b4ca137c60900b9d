//! Safe proxies around host functions.
//!
//! Every callable placed in a template namespace is a [`SafeProxy`]. Before
//! the wrapped function runs, each argument is walked and anything callable
//! that is not itself a proxy is refused. Groups of proxies are exposed as a
//! [`HelperNamespace`] (`presto.latest_partition`, `datetime.now`, ...).

use crate::error::{into_minijinja, SandboxViolation, ViolationCategory};
use crate::values::is_data_object;
use minijinja::value::{Object, ObjectRepr, Value, ValueKind};
use minijinja::{Error, State};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// How deep the argument walker descends before refusing the value.
///
/// Template values are immutable, so a cycle can only be an unbounded
/// nesting; the limit stands in for an identity check.
pub const MAX_ARGUMENT_DEPTH: usize = 32;

/// A host function that validates its arguments before running.
#[derive(Debug)]
pub struct SafeProxy {
    name: String,
    inner: Value,
}

impl SafeProxy {
    /// Wrap `function` (usually a `Value::from_function`) as a proxy value.
    pub fn wrap(name: impl Into<String>, function: Value) -> Value {
        Value::from_object(SafeProxy {
            name: name.into(),
            inner: function,
        })
    }

    /// Name the proxy was registered under
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Object for SafeProxy {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call(self: &Arc<Self>, state: &State<'_, '_>, args: &[Value]) -> Result<Value, Error> {
        if let Err(violation) = validate_arguments(args) {
            log::warn!(
                "Rejected argument to {}: {}",
                self.name,
                violation.category
            );
            return Err(into_minijinja(violation));
        }
        self.inner.call(state, args)
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<helper {}>", self.name)
    }
}

/// Check every argument of a call.
pub fn validate_arguments(args: &[Value]) -> Result<(), SandboxViolation> {
    args.iter().try_for_each(|arg| validate_value(arg, 0))
}

/// Walk `value`, refusing callables that are not proxies.
pub fn validate_value(value: &Value, depth: usize) -> Result<(), SandboxViolation> {
    if depth > MAX_ARGUMENT_DEPTH {
        return Err(SandboxViolation::new(ViolationCategory::NestingLimit));
    }
    match value.kind() {
        ValueKind::Undefined
        | ValueKind::None
        | ValueKind::Bool
        | ValueKind::Number
        | ValueKind::String
        | ValueKind::Bytes => Ok(()),
        ValueKind::Seq | ValueKind::Iterable => {
            if let Ok(items) = value.try_iter() {
                for item in items {
                    validate_value(&item, depth + 1)?;
                }
            }
            Ok(())
        }
        ValueKind::Map => {
            if is_proxy_like(value) {
                return Ok(());
            }
            if let Ok(keys) = value.try_iter() {
                for key in keys {
                    validate_value(&key, depth + 1)?;
                    if let Ok(item) = value.get_item(&key) {
                        validate_value(&item, depth + 1)?;
                    }
                }
            }
            Ok(())
        }
        _ if is_proxy_like(value) || is_data_object(value) => Ok(()),
        _ => Err(SandboxViolation::new(ViolationCategory::CallableArgument)),
    }
}

fn is_proxy_like(value: &Value) -> bool {
    value.downcast_object_ref::<SafeProxy>().is_some()
        || value.downcast_object_ref::<HelperNamespace>().is_some()
}

/// A named group of proxies, optionally callable itself.
///
/// Members are reached as attributes or methods; names starting with `_`
/// are never exposed.
#[derive(Debug)]
pub struct HelperNamespace {
    name: String,
    members: BTreeMap<String, Value>,
    constructor: Option<Value>,
}

impl HelperNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
            constructor: None,
        }
    }

    /// Add a member value. Functions should already be wrapped in a proxy.
    pub fn with_member(mut self, name: impl Into<String>, value: Value) -> Self {
        self.members.insert(name.into(), value);
        self
    }

    /// Make the namespace itself callable, as `datetime(2024, 1, 31)` is.
    pub fn with_constructor(mut self, constructor: Value) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn member(&self, name: &str) -> Option<&Value> {
        if name.starts_with('_') {
            return None;
        }
        self.members.get(name)
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn into_value(self) -> Value {
        Value::from_object(self)
    }
}

impl Object for HelperNamespace {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        key.as_str().and_then(|k| self.member(k)).cloned()
    }

    fn call(self: &Arc<Self>, state: &State<'_, '_>, args: &[Value]) -> Result<Value, Error> {
        match &self.constructor {
            Some(constructor) => constructor.call(state, args),
            None => Err(Error::new(
                minijinja::ErrorKind::InvalidOperation,
                format!("{} is not callable", self.name),
            )),
        }
    }

    fn call_method(
        self: &Arc<Self>,
        state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match self.member(method) {
            Some(member) => member.call(state, args),
            None => Err(Error::new(
                minijinja::ErrorKind::UnknownMethod,
                format!("{} has no helper named {}", self.name, method),
            )),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<namespace {}>", self.name)
    }
}

#[cfg(test)]
#[path = "proxy_test.rs"]
mod tests;
