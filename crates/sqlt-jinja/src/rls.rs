//! Rendering of row-level-security clauses.
//!
//! Clauses may use the context helpers (`{{ current_username() }}`), so each
//! one is rendered by its own processor before the predicates are composed.

use crate::error::TemplateResult;
use crate::namespace::Bindings;
use crate::processor::TableContext;
use crate::runtime::TemplateRuntime;
use sqlt_core::rls::{compose_predicates, rls_cache_key};
use sqlt_core::{RenderInputs, RowLevelFilter};
use sqlt_db::Database;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Predicates for one table and the cache key they contribute
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RlsPredicates {
    /// Predicates to AND into the query
    pub predicates: Vec<String>,
    /// Order-independent identity of the filters
    pub cache_key: Vec<String>,
    /// Contributions made by helpers while rendering the clauses
    pub extra_cache_keys: Vec<serde_json::Value>,
    /// Filter columns the clauses consumed
    pub applied_filters: BTreeSet<String>,
    /// Filter columns the clauses took over from the outer query
    pub removed_filters: BTreeSet<String>,
}

/// Render each filter clause and compose the results.
pub fn render_rls_predicates(
    runtime: &TemplateRuntime,
    database: Arc<dyn Database>,
    inputs: &RenderInputs,
    table: Option<&TableContext>,
    filters: &[RowLevelFilter],
) -> TemplateResult<RlsPredicates> {
    let mut rendered: Vec<(Option<&str>, String)> = Vec::with_capacity(filters.len());
    let mut extra_cache_keys = Vec::new();
    let mut applied_filters = BTreeSet::new();
    let mut removed_filters = BTreeSet::new();

    for filter in filters {
        let mut processor = runtime.get_template_processor(
            database.clone(),
            inputs.clone(),
            table,
            None,
            Bindings::new(),
        )?;
        let clause = processor.process_template(&filter.clause, Bindings::new())?;
        let snapshot = processor.snapshot();
        extra_cache_keys.extend(snapshot.extra_cache_keys);
        applied_filters.extend(snapshot.applied_filters);
        removed_filters.extend(snapshot.removed_filters);
        rendered.push((filter.group_key.as_deref(), clause));
    }

    let predicates = compose_predicates(rendered.iter().map(|(group, clause)| (*group, clause.as_str())));
    log::debug!("Composed {} RLS predicates from {} filters", predicates.len(), filters.len());

    Ok(RlsPredicates {
        predicates,
        cache_key: rls_cache_key(filters),
        extra_cache_keys,
        applied_filters,
        removed_filters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use serde_json::json;
    use sqlt_core::{FormData, TemplateConfig, UserIdentity};
    use sqlt_db::DuckDbBackend;

    fn setup() -> (TemplateRuntime, Arc<dyn Database>, RenderInputs) {
        let runtime = TemplateRuntime::from_config(TemplateConfig::default()).unwrap();
        let db: Arc<dyn Database> = Arc::new(DuckDbBackend::in_memory().unwrap());
        let inputs = RenderInputs::new().with_user(UserIdentity {
            username: Some("bob".to_string()),
            ..UserIdentity::default()
        });
        (runtime, db, inputs)
    }

    #[test]
    fn test_clauses_are_rendered_and_grouped() {
        let (runtime, db, inputs) = setup();
        let filters = vec![
            RowLevelFilter::new(2, "owner = '{{ current_username() }}'"),
            RowLevelFilter::new(1, "region = 'emea'").with_group_key("region"),
            RowLevelFilter::new(3, "region = 'apac'").with_group_key("region"),
        ];
        let result = render_rls_predicates(&runtime, db, &inputs, None, &filters).unwrap();
        assert_eq!(
            result.predicates,
            vec![
                "(owner = 'bob')".to_string(),
                "((region = 'emea') OR (region = 'apac'))".to_string(),
            ]
        );
        assert_eq!(result.extra_cache_keys, vec![json!("bob")]);
        assert_eq!(result.cache_key[0], "1-region-region = 'emea'");
    }

    #[test]
    fn test_filter_state_is_carried() {
        let (runtime, db, inputs) = setup();
        let form_data: FormData = serde_json::from_value(json!({
            "adhoc_filters": [{"clause": "WHERE", "operator": "==", "subject": "region", "comparator": "emea"}],
            "extra_filters": [{"col": "country", "op": "in", "val": ["FR"]}]
        }))
        .unwrap();
        let inputs = inputs.with_form_data(form_data);
        let filters = vec![
            RowLevelFilter::new(1, "region IN ({{ filter_values('region') | sqljoin }})"),
            RowLevelFilter::new(2, "{% for f in get_filters('country', remove_filter=True) %}country {{ f.op }} {{ f.val | where_in }}{% endfor %}"),
        ];
        let result = render_rls_predicates(&runtime, db, &inputs, None, &filters).unwrap();
        assert_eq!(
            result.predicates,
            vec!["(region IN ('emea'))".to_string(), "(country IN ('FR'))".to_string()]
        );
        assert_eq!(
            result.applied_filters.into_iter().collect::<Vec<_>>(),
            vec!["country".to_string(), "region".to_string()]
        );
        assert_eq!(result.removed_filters.into_iter().collect::<Vec<_>>(), vec!["country".to_string()]);
        assert_eq!(result.extra_cache_keys.len(), 2);
    }

    #[test]
    fn test_clause_errors_propagate() {
        let (runtime, db, inputs) = setup();
        let filters = vec![RowLevelFilter::new(1, "{{ ''.__class__ }}")];
        let err = render_rls_predicates(&runtime, db, &inputs, None, &filters).unwrap_err();
        assert!(matches!(err, TemplateError::Sandbox(_)));
    }

    #[test]
    fn test_no_filters() {
        let (runtime, db, inputs) = setup();
        let result = render_rls_predicates(&runtime, db, &inputs, None, &[]).unwrap();
        assert_eq!(result, RlsPredicates::default());
    }
}
