//! `time`, `uuid` and `random` namespaces of the base layer

use crate::error::{into_minijinja, HelperError};
use crate::proxy::{HelperNamespace, SafeProxy};
use minijinja::value::{Object, ObjectRepr, Value};
use minijinja::Error;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A UUID value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UuidValue(pub Uuid);

impl Object for UuidValue {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "hex" => Some(Value::from(self.0.simple().to_string())),
            "version" => Some(Value::from(self.0.get_version_num())),
            _ => None,
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

fn uuid_arg(helper: &str, value: &Value) -> Result<Uuid, Error> {
    if let Some(u) = value.downcast_object_ref::<UuidValue>() {
        return Ok(u.0);
    }
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| into_minijinja(HelperError::new(helper, "expected a UUID namespace")))
}

pub(crate) fn uuid3_fn() -> Value {
    SafeProxy::wrap(
        "uuid3",
        Value::from_function(|namespace: Value, name: &str| -> Result<Value, Error> {
            let ns = uuid_arg("uuid3", &namespace)?;
            Ok(Value::from_object(UuidValue(Uuid::new_v3(&ns, name.as_bytes()))))
        }),
    )
}

pub(crate) fn uuid4_fn() -> Value {
    SafeProxy::wrap(
        "uuid4",
        Value::from_function(|| Value::from_object(UuidValue(Uuid::new_v4()))),
    )
}

pub(crate) fn uuid5_fn() -> Value {
    SafeProxy::wrap(
        "uuid5",
        Value::from_function(|namespace: Value, name: &str| -> Result<Value, Error> {
            let ns = uuid_arg("uuid5", &namespace)?;
            Ok(Value::from_object(UuidValue(Uuid::new_v5(&ns, name.as_bytes()))))
        }),
    )
}

/// `uuid` namespace; `uuid.UUID('...')` parses a UUID string.
pub(crate) fn uuid_namespace() -> Value {
    HelperNamespace::new("uuid")
        .with_member("uuid3", uuid3_fn())
        .with_member("uuid4", uuid4_fn())
        .with_member("uuid5", uuid5_fn())
        .with_member(
            "UUID",
            SafeProxy::wrap(
                "uuid.UUID",
                Value::from_function(|s: &str| -> Result<Value, Error> {
                    Uuid::parse_str(s)
                        .map(|u| Value::from_object(UuidValue(u)))
                        .map_err(|e| into_minijinja(HelperError::new("uuid.UUID", e.to_string())))
                }),
            ),
        )
        .with_member("NAMESPACE_DNS", Value::from_object(UuidValue(Uuid::NAMESPACE_DNS)))
        .with_member("NAMESPACE_URL", Value::from_object(UuidValue(Uuid::NAMESPACE_URL)))
        .with_member("NAMESPACE_OID", Value::from_object(UuidValue(Uuid::NAMESPACE_OID)))
        .with_member("NAMESPACE_X500", Value::from_object(UuidValue(Uuid::NAMESPACE_X500)))
        .into_value()
}

/// `time.time()`, seconds since the epoch as a float
pub(crate) fn time_namespace() -> Value {
    HelperNamespace::new("time")
        .with_member(
            "time",
            SafeProxy::wrap(
                "time.time",
                Value::from_function(|| {
                    let now = chrono::Utc::now();
                    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
                }),
            ),
        )
        .into_value()
}

/// `random.random()`, `random.randint(a, b)` and `random.choice(seq)`
pub(crate) fn random_namespace() -> Value {
    HelperNamespace::new("random")
        .with_member(
            "random",
            SafeProxy::wrap(
                "random.random",
                Value::from_function(|| rand::thread_rng().gen::<f64>()),
            ),
        )
        .with_member(
            "randint",
            SafeProxy::wrap(
                "random.randint",
                Value::from_function(|low: i64, high: i64| -> Result<i64, Error> {
                    if low > high {
                        return Err(into_minijinja(HelperError::new(
                            "random.randint",
                            format!("empty range for randint({low}, {high})"),
                        )));
                    }
                    Ok(rand::thread_rng().gen_range(low..=high))
                }),
            ),
        )
        .with_member(
            "choice",
            SafeProxy::wrap(
                "random.choice",
                Value::from_function(|seq: Vec<Value>| -> Result<Value, Error> {
                    seq.choose(&mut rand::thread_rng()).cloned().ok_or_else(|| {
                        into_minijinja(HelperError::new(
                            "random.choice",
                            "cannot choose from an empty sequence",
                        ))
                    })
                }),
            ),
        )
        .into_value()
}
