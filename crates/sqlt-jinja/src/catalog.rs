//! `metric()` and `dataset()` over a semantic catalog.
//!
//! The catalog itself (datasets, their SQL and metrics, chart ownership) is
//! owned by the platform's persistence layer; this module only defines the
//! lookups the helpers need.

use crate::context::ExtraCache;
use crate::error::{into_minijinja, HelperError};
use minijinja::value::Kwargs;
use minijinja::Error;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A dataset as the helpers see it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetInfo {
    pub id: i64,
    pub name: String,
    /// Metric name to SQL expression
    pub metrics: BTreeMap<String, String>,
}

/// Read-only access to datasets and charts.
pub trait SemanticCatalog: Send + Sync {
    fn dataset(&self, id: i64) -> Option<DatasetInfo>;

    /// The dataset's SQL, optionally grouped by `columns` with its metrics.
    fn dataset_sql(&self, id: i64, include_metrics: bool, columns: Option<&[String]>) -> Option<String>;

    /// The dataset a chart is built on.
    fn chart_dataset_id(&self, chart_id: i64) -> Option<i64>;
}

/// Resolve `metric_key` to its SQL expression.
///
/// The dataset comes from `dataset_id`, else `url_params.datasource_id`,
/// else the dataset of the request's chart.
pub fn resolve_metric(
    catalog: &dyn SemanticCatalog,
    cache: &ExtraCache,
    metric_key: &str,
    dataset_id: Option<i64>,
) -> Result<String, HelperError> {
    let dataset_id = dataset_id.or_else(|| {
        let form_data = cache.inputs().form_data().found("metric")?;
        form_data
            .url_datasource_id()
            .or_else(|| form_data.chart_id().and_then(|id| catalog.chart_dataset_id(id)))
    });
    let Some(dataset_id) = dataset_id else {
        return Err(HelperError::new(
            "metric",
            format!("Please specify the Dataset ID for the ``{metric_key}`` metric in the Jinja macro."),
        ));
    };
    let dataset = catalog
        .dataset(dataset_id)
        .ok_or_else(|| HelperError::new("metric", format!("Dataset ID {dataset_id} not found.")))?;
    dataset.metrics.get(metric_key).cloned().ok_or_else(|| {
        HelperError::new(
            "metric",
            format!("Metric ``{metric_key}`` not found in {}.", dataset.name),
        )
    })
}

/// Create the metric() function
///
/// Usage in templates:
/// ```jinja
/// SELECT {{ metric("revenue", 42) }} FROM sales
/// ```
pub(crate) fn make_metric_fn(
    catalog: Arc<dyn SemanticCatalog>,
    cache: ExtraCache,
) -> impl Fn(&str, Option<i64>, Kwargs) -> Result<String, Error> + Send + Sync + Clone + 'static {
    move |metric_key: &str, dataset_id: Option<i64>, kwargs: Kwargs| {
        let dataset_id = match dataset_id {
            Some(id) => Some(id),
            None => kwargs.get::<Option<i64>>("dataset_id")?,
        };
        kwargs.assert_all_used()?;
        resolve_metric(catalog.as_ref(), &cache, metric_key, dataset_id).map_err(into_minijinja)
    }
}

/// Create the dataset() function
///
/// Usage in templates:
/// ```jinja
/// SELECT * FROM {{ dataset(42, include_metrics=True, columns=["ds"]) }}
/// ```
pub(crate) fn make_dataset_fn(
    catalog: Arc<dyn SemanticCatalog>,
) -> impl Fn(i64, Option<bool>, Option<Vec<String>>, Kwargs) -> Result<String, Error>
       + Send
       + Sync
       + Clone
       + 'static {
    move |dataset_id: i64, include_metrics: Option<bool>, columns: Option<Vec<String>>, kwargs: Kwargs| {
        let include_metrics = match include_metrics {
            Some(v) => v,
            None => kwargs.get::<Option<bool>>("include_metrics")?.unwrap_or(false),
        };
        let columns = match columns {
            Some(c) => Some(c),
            None => kwargs.get::<Option<Vec<String>>>("columns")?,
        };
        kwargs.assert_all_used()?;
        let sql = catalog
            .dataset_sql(dataset_id, include_metrics, columns.as_deref())
            .ok_or_else(|| dataset_not_found(dataset_id))?;
        Ok(format!("(\n{sql}\n) AS dataset_{dataset_id}"))
    }
}

fn dataset_not_found(dataset_id: i64) -> Error {
    into_minijinja(HelperError::new("dataset", format!("Dataset {dataset_id} not found!")))
}
