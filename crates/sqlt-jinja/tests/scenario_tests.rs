//! End-to-end rendering scenarios
//!
//! Each test builds a runtime the way an installer would, asks it for a
//! processor and renders through the public API only.

use serde_json::json;
use sqlt_core::{FormData, RenderInputs, TemplateConfig, UserIdentity};
use sqlt_db::{Database, DbResult, DuckDbBackend, Row};
use sqlt_jinja::{
    has_extra_cache_key_calls, Bindings, TemplateError, TemplateProcessor, TemplateRuntime,
    ViolationCategory,
};
use std::path::Path;
use std::sync::Arc;

/// A database that only names its backend
struct Named(&'static str);

impl Database for Named {
    fn backend(&self) -> &str {
        self.0
    }

    fn partition_columns(&self, _table: &str, _schema: Option<&str>) -> DbResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn query_rows(&self, _sql: &str, _width: usize) -> DbResult<Vec<Row>> {
        Ok(Vec::new())
    }
}

fn runtime() -> TemplateRuntime {
    let config = TemplateConfig::load(Path::new("tests/fixtures/template_config.yml")).unwrap();
    TemplateRuntime::from_config(config).unwrap()
}

fn postgres_processor(inputs: RenderInputs) -> TemplateProcessor {
    runtime()
        .get_template_processor(Arc::new(Named("postgresql")), inputs, None, None, Bindings::new())
        .unwrap()
}

fn render(inputs: RenderInputs, sql: &str) -> (Result<String, TemplateError>, TemplateProcessor) {
    let mut processor = postgres_processor(inputs);
    let result = processor.process_template(sql, Bindings::new());
    (result, processor)
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[test]
fn test_basic_substitution() {
    let (result, processor) = render(RenderInputs::new(), "SELECT '{{ 1 + 1 }}'");
    assert_eq!(result.unwrap(), "SELECT '2'");
    assert!(processor.snapshot().is_empty());
}

#[test]
fn test_url_param_with_quoting() {
    let inputs = RenderInputs::new().with_arg("foo", "O'Brien");
    let (result, processor) = render(
        inputs,
        "SELECT * FROM t WHERE name = '{{ url_param('foo') }}'",
    );
    assert_eq!(result.unwrap(), "SELECT * FROM t WHERE name = 'O''Brien'");
    assert_eq!(processor.extra_cache_keys(), vec![json!("O''Brien")]);
}

#[test]
fn test_adhoc_filter_extraction() {
    let form_data: FormData = serde_json::from_value(json!({
        "adhoc_filters": [{
            "clause": "WHERE",
            "operator": "in",
            "subject": "name",
            "comparator": ["foo", "bar"],
        }]
    }))
    .unwrap();
    let (result, processor) = render(
        RenderInputs::new().with_form_data(form_data),
        "SELECT * FROM t WHERE n IN ({{ filter_values('name') | sqljoin }})",
    );
    assert_eq!(result.unwrap(), "SELECT * FROM t WHERE n IN ('foo', 'bar')");
    assert_eq!(
        processor.applied_filters().into_iter().collect::<Vec<_>>(),
        vec!["name".to_string()]
    );
    assert!(processor.removed_filters().is_empty());
}

#[test]
fn test_lambda_argument_is_rejected() {
    let (result, processor) = render(RenderInputs::new(), "{{ cache_key_wrapper((lambda: 1)) }}");
    let err = result.unwrap_err();
    assert_eq!(err.violation_category(), Some(ViolationCategory::CallableConstruction));
    assert!(processor.extra_cache_keys().is_empty());
}

#[test]
fn test_trino_backend_alias() {
    let db = DuckDbBackend::in_memory().unwrap().with_backend_name("trino");
    db.execute_batch(
        r#"
        CREATE TABLE "sales$partitions" (ds VARCHAR);
        INSERT INTO "sales$partitions" VALUES ('2024-02-01'), ('2024-02-02');
        "#,
    )
    .unwrap();
    let db: Arc<dyn Database> = Arc::new(db);
    let runtime = runtime();

    let mut presto = runtime
        .get_template_processor(db.clone(), RenderInputs::new(), None, None, Bindings::new())
        .unwrap();
    let mut trino = runtime
        .get_template_processor(db, RenderInputs::new(), None, None, Bindings::new())
        .unwrap();
    let a = presto
        .process_template("{{ presto.latest_partition('sales') }}", Bindings::new())
        .unwrap();
    let b = trino
        .process_template("{{ trino.latest_partition('sales') }}", Bindings::new())
        .unwrap();
    assert_eq!(a, "2024-02-02");
    assert_eq!(a, b);
}

#[test]
fn test_locale_cache_contribution() {
    let inputs = RenderInputs::new().with_accept_language("de-DE,de;q=0.9,en;q=0.5");
    let (result, processor) = render(inputs.clone(), "-- locale: {{ current_user_locale() }}");
    assert!(result.unwrap().ends_with("de"));
    assert!(processor.extra_cache_keys().contains(&json!("de")));

    let (result, processor) = render(
        inputs,
        "-- locale: {{ current_user_locale(add_to_cache_keys=False) }}",
    );
    assert!(result.unwrap().ends_with("de"));
    assert!(processor.extra_cache_keys().is_empty());
}

#[test]
fn test_session_locale_beats_accept_language() {
    let inputs = RenderInputs::new()
        .with_session_locale("fr")
        .with_accept_language("de");
    let (result, _) = render(inputs, "{{ current_user_locale() }}");
    assert_eq!(result.unwrap(), "fr");
}

// ── Invariants ──────────────────────────────────────────────────────────

#[test]
fn test_marker_free_template_is_identity() {
    for sql in ["", "SELECT 1", "SELECT '{' || '}'\n", "  \n\tSELECT x FROM t -- %\n\n"] {
        let (result, _) = render(RenderInputs::new(), sql);
        assert_eq!(result.unwrap(), sql);
    }
}

#[test]
fn test_no_request_neutrality() {
    let (result, _) = render(
        RenderInputs::new(),
        "{{ filter_values('x') | length }}|{{ url_param('x') is none }}|{{ current_user_id() is none }}",
    );
    assert_eq!(result.unwrap(), "0|true|true");
}

#[test]
fn test_different_output_means_different_state() {
    let sql = "SELECT * FROM t WHERE owner = '{{ current_username() }}'";
    let user = |name: &str| {
        RenderInputs::new().with_user(UserIdentity {
            username: Some(name.to_string()),
            ..UserIdentity::default()
        })
    };
    let (a, pa) = render(user("alice"), sql);
    let (b, pb) = render(user("bob"), sql);
    assert_ne!(a.unwrap(), b.unwrap());
    assert_ne!(pa.snapshot(), pb.snapshot());
    assert_ne!(pa.snapshot().cache_key("q"), pb.snapshot().cache_key("q"));
}

#[test]
fn test_different_filter_values_mean_different_state() {
    let sql = "SELECT * FROM t WHERE n IN ({{ filter_values('name') | sqljoin }})";
    let by_name = |value: &str| {
        let form_data: FormData = serde_json::from_value(json!({
            "adhoc_filters": [{"clause": "WHERE", "operator": "in", "subject": "name", "comparator": [value]}]
        }))
        .unwrap();
        RenderInputs::new().with_form_data(form_data)
    };
    let (a, pa) = render(by_name("foo"), sql);
    let (b, pb) = render(by_name("bar"), sql);
    assert_ne!(a.unwrap(), b.unwrap());
    assert_ne!(pa.snapshot(), pb.snapshot());
    assert_ne!(pa.snapshot().cache_key("q"), pb.snapshot().cache_key("q"));
}

#[test]
fn test_escaped_default_round_trips() {
    for s in ["O'Malley", "''", "it''s", "a'b'c'"] {
        let source = format!("{{{{ url_param('k', {}) }}}}", serde_json::to_string(s).unwrap());
        let (result, _) = render(RenderInputs::new(), &source);
        let escaped = result.unwrap();
        assert_eq!(escaped.replace("''", "'"), s, "escaping {s:?}");
        assert_eq!(escaped.matches('\'').count() % 2, 0);
    }
}

#[test]
fn test_removed_filters_are_applied() {
    let form_data: FormData = serde_json::from_value(json!({
        "extra_filters": [{"col": "country", "op": "in", "val": ["FR"]}]
    }))
    .unwrap();
    let (result, processor) = render(
        RenderInputs::new().with_form_data(form_data),
        "{% for f in get_filters('country', remove_filter=True) %}{{ f.col }} {{ f.op }} {{ f.val | where_in }}{% endfor %}",
    );
    assert_eq!(result.unwrap(), "country IN ('FR')");
    let snapshot = processor.snapshot();
    assert!(snapshot.removed_filters.contains("country"));
    assert!(snapshot.removed_filters.is_subset(&snapshot.applied_filters));
}

#[test]
fn test_config_addons_are_visible() {
    let (result, _) = render(RenderInputs::new(), "{{ warehouse }}.t LIMIT {{ default_limit }}");
    assert_eq!(result.unwrap(), "analytics.t LIMIT 1000");
}

#[test]
fn test_cache_call_detection_matches_templates() {
    assert!(has_extra_cache_key_calls("SELECT '{{ current_user_locale() }}'"));
    assert!(!has_extra_cache_key_calls("SELECT '{{ 1 + 1 }}'"));
}
