use super::*;
use serde_json::json;

#[test]
fn test_contributions_keep_order_and_duplicates() {
    let mut state = ExtraCacheState::default();
    state.note_cache_contribution(json!("b"));
    state.note_cache_contribution(json!("a"));
    state.note_cache_contribution(json!("b"));
    assert_eq!(state.extra_cache_keys(), &[json!("b"), json!("a"), json!("b")]);
}

#[test]
fn test_removed_implies_applied() {
    let mut state = ExtraCacheState::default();
    state.note_removed_filter("country");
    assert!(state.applied_filters().contains("country"));
    assert!(state.removed_filters().is_subset(state.applied_filters()));
}

#[test]
fn test_snapshot_equality() {
    let mut a = ExtraCacheState::new(Some(SqlDialect::Postgres));
    let mut b = ExtraCacheState::new(None);
    a.note_applied_filter("name");
    b.note_applied_filter("name");
    assert_eq!(a.snapshot(), b.snapshot());
    assert_eq!(a.dialect(), Some(SqlDialect::Postgres));

    b.note_cache_contribution(json!(1));
    assert_ne!(a.snapshot(), b.snapshot());
}

#[test]
fn test_cache_key_varies_with_state() {
    let empty = ExtraCacheSnapshot::default();
    assert!(empty.is_empty());

    let mut state = ExtraCacheState::default();
    state.note_cache_contribution(json!("de"));
    let with_locale = state.snapshot();

    assert_ne!(empty.cache_key("q1"), with_locale.cache_key("q1"));
    assert_ne!(with_locale.cache_key("q1"), with_locale.cache_key("q2"));
    assert_eq!(with_locale.cache_key("q1"), state.snapshot().cache_key("q1"));
    assert_eq!(with_locale.cache_key("q1").len(), 64);
}

#[test]
fn test_cache_key_sections_are_distinct() {
    let mut applied = ExtraCacheState::default();
    applied.note_applied_filter("x");
    let mut keyed = ExtraCacheState::default();
    keyed.note_cache_contribution(json!("x"));
    assert_ne!(
        applied.snapshot().cache_key("q"),
        keyed.snapshot().cache_key("q")
    );
}

#[test]
fn test_has_extra_cache_key_calls() {
    assert!(has_extra_cache_key_calls("SELECT '{{ current_username() }}'"));
    assert!(has_extra_cache_key_calls(
        "SELECT * FROM t WHERE a = '{{ url_param(\"a\") }}'"
    ));
    assert!(has_extra_cache_key_calls(
        "{% if current_user_id() == 1 %}x{% endif %}"
    ));
    assert!(!has_extra_cache_key_calls("SELECT '{{ 1 + 1 }}'"));
    assert!(!has_extra_cache_key_calls("SELECT current_username()"));
    assert!(!has_extra_cache_key_calls("{{ my_url_param('a') }}"));
}
