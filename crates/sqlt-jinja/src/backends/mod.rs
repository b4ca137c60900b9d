//! Backend extensions: helpers scoped to one engine family.
//!
//! An extension contributes top-level namespace entries (`presto`,
//! `hive`, ...) and may rewrite the source before it is checked and
//! compiled. Built-in extensions cover the Presto and Hive families;
//! installers register their own through the runtime builder.

mod hive;
mod presto;

pub use hive::HiveExtension;
pub use presto::PrestoExtension;

use crate::context::ExtraCache;
use crate::error::{into_minijinja, BackendError, BackendFailure, TemplateResult};
use crate::proxy::{HelperNamespace, SafeProxy};
use crate::values::value_to_text;
use minijinja::value::{Kwargs, Value};
use minijinja::Error;
use sqlt_core::sql_utils::split_table_name;
use sqlt_db::{Database, DbError, PartitionStyle};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a backend helper may reach during one render
#[derive(Clone)]
pub struct BackendScope {
    pub database: Arc<dyn Database>,
    /// Schema for unqualified table names: the query's, else the table's
    pub default_schema: Option<String>,
    pub cache: ExtraCache,
}

impl BackendScope {
    /// Split `name` into schema and table, falling back to the default schema.
    pub fn resolve_table<'a>(&'a self, name: &'a str) -> (Option<&'a str>, &'a str) {
        let (schema, table) = split_table_name(name);
        (schema.or(self.default_schema.as_deref()), table)
    }
}

/// Engine-specific template support
pub trait BackendExtension: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Top-level entries added to the namespace of a render.
    fn entries(&self, scope: &BackendScope) -> Vec<(String, Value)>;

    /// Rewrite the source before it is checked and compiled.
    fn preprocess(&self, sql: &str, _scope: &BackendScope) -> TemplateResult<String> {
        Ok(sql.to_string())
    }
}

/// The built-in extension for `backend`, if any.
///
/// Trino also answers to `presto.*` and Spark to `hive.*`.
pub fn builtin_extension(backend: &str) -> Option<Arc<dyn BackendExtension>> {
    match backend.to_ascii_lowercase().as_str() {
        "presto" => Some(Arc::new(PrestoExtension::presto())),
        "trino" => Some(Arc::new(PrestoExtension::trino())),
        "hive" => Some(Arc::new(HiveExtension::hive())),
        "spark" => Some(Arc::new(HiveExtension::spark())),
        _ => None,
    }
}

fn backend_error(helper: &str, args: String, source: BackendFailure) -> Error {
    log::debug!("{helper}({args}) failed: {source}");
    into_minijinja(BackendError {
        helper: helper.to_string(),
        args,
        source,
    })
}

fn db_failure<'a>(helper: &'a str, args: &'a str) -> impl Fn(DbError) -> Error + 'a {
    move |e| backend_error(helper, args.to_string(), BackendFailure::Db(e))
}

/// Build the partition helper namespace `label` backed by `style`.
pub(crate) fn partition_namespace(label: &str, style: PartitionStyle, scope: &BackendScope) -> Value {
    let latest = {
        let scope = scope.clone();
        let helper = format!("{label}.latest_partition");
        move |table_name: &str| -> Result<String, Error> {
            latest_first(&scope, style, &helper, table_name)
        }
    };
    let first = {
        let scope = scope.clone();
        let helper = format!("{label}.first_latest_partition");
        move |table_name: &str| -> Result<String, Error> {
            latest_first(&scope, style, &helper, table_name)
        }
    };
    let partitions = {
        let scope = scope.clone();
        let helper = format!("{label}.latest_partitions");
        move |table_name: &str| -> Result<Value, Error> {
            let args = format!("'{table_name}'");
            let (schema, table) = scope.resolve_table(table_name);
            let latest = style
                .latest_partition(scope.database.as_ref(), table, schema, true)
                .map_err(db_failure(&helper, &args))?;
            Ok(match latest.values {
                Some(values) => Value::from(
                    values
                        .into_iter()
                        .map(|v| v.map(Value::from).unwrap_or(Value::from(())))
                        .collect::<Vec<_>>(),
                ),
                None => Value::from(()),
            })
        }
    };
    let sub = {
        let scope = scope.clone();
        let helper = format!("{label}.latest_sub_partition");
        move |table_name: &str, kwargs: Kwargs| -> Result<String, Error> {
            let mut filters = BTreeMap::new();
            for key in kwargs.args() {
                let value: Value = kwargs.get(key)?;
                filters.insert(key.to_string(), value_to_text(&value).unwrap_or_default());
            }
            kwargs.assert_all_used()?;

            let mut args = format!("'{table_name}'");
            for (k, v) in &filters {
                args.push_str(&format!(", {k}='{v}'"));
            }
            let (schema, table) = scope.resolve_table(table_name);
            style
                .latest_sub_partition(scope.database.as_ref(), table, schema, &filters)
                .map_err(db_failure(&helper, &args))?
                .ok_or_else(|| {
                    backend_error(
                        &helper,
                        args.clone(),
                        BackendFailure::NoPartition {
                            table: table_name.to_string(),
                        },
                    )
                })
        }
    };

    HelperNamespace::new(label)
        .with_member(
            "latest_partition",
            SafeProxy::wrap(format!("{label}.latest_partition"), Value::from_function(latest)),
        )
        .with_member(
            "first_latest_partition",
            SafeProxy::wrap(
                format!("{label}.first_latest_partition"),
                Value::from_function(first),
            ),
        )
        .with_member(
            "latest_partitions",
            SafeProxy::wrap(format!("{label}.latest_partitions"), Value::from_function(partitions)),
        )
        .with_member(
            "latest_sub_partition",
            SafeProxy::wrap(format!("{label}.latest_sub_partition"), Value::from_function(sub)),
        )
        .into_value()
}

fn latest_first(
    scope: &BackendScope,
    style: PartitionStyle,
    helper: &str,
    table_name: &str,
) -> Result<String, Error> {
    let args = format!("'{table_name}'");
    let (schema, table) = scope.resolve_table(table_name);
    let latest = style
        .latest_partition(scope.database.as_ref(), table, schema, true)
        .map_err(db_failure(helper, &args))?;
    latest.first().map(str::to_string).ok_or_else(|| {
        backend_error(
            helper,
            args.clone(),
            BackendFailure::NoPartition {
                table: table_name.to_string(),
            },
        )
    })
}

/// One partition namespace per engine name and alias, each labelled with
/// the name templates call it by.
pub(crate) fn aliased_entries(
    names: &[&str],
    style: PartitionStyle,
    scope: &BackendScope,
) -> Vec<(String, Value)> {
    names
        .iter()
        .map(|name| (name.to_string(), partition_namespace(name, style, scope)))
        .collect()
}
