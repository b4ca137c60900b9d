use super::*;
use crate::partitions::PartitionStyle;
use std::collections::BTreeMap;

fn trino_with_events() -> DuckDbBackend {
    let db = DuckDbBackend::in_memory().unwrap().with_backend_name("trino");
    db.execute_batch(
        r#"
        CREATE SCHEMA web;
        CREATE TABLE web."events$partitions" (ds VARCHAR, hour INTEGER);
        INSERT INTO web."events$partitions" VALUES
            ('2024-01-01', 1), ('2024-01-02', 3), ('2024-01-02', 7), ('2024-01-03', 2);
        CREATE TABLE "daily$partitions" (ds VARCHAR);
        INSERT INTO "daily$partitions" VALUES ('2023-12-30'), ('2023-12-31');
        "#,
    )
    .unwrap();
    db
}

#[test]
fn test_in_memory() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert_eq!(db.backend(), "duckdb");
    assert_eq!(db.dialect(), sqlt_core::SqlDialect::DuckDb);
}

#[test]
fn test_backend_name_override() {
    let db = DuckDbBackend::in_memory().unwrap().with_backend_name("trino");
    assert_eq!(db.backend(), "trino");
    assert_eq!(db.dialect(), sqlt_core::SqlDialect::Trino);
}

#[test]
fn test_partition_columns_in_key_order() {
    let db = trino_with_events();
    let cols = db.partition_columns("events", Some("web")).unwrap();
    assert_eq!(cols, vec!["ds".to_string(), "hour".to_string()]);
}

#[test]
fn test_partition_columns_default_schema() {
    let db = trino_with_events();
    assert_eq!(db.partition_columns("daily", None).unwrap(), vec!["ds"]);
}

#[test]
fn test_partition_columns_unpartitioned_table() {
    let db = trino_with_events();
    assert!(db.partition_columns("missing", None).unwrap().is_empty());
}

#[test]
fn test_query_rows_casts_to_text() {
    let db = trino_with_events();
    let rows = db
        .query_rows("SELECT CAST(42 AS VARCHAR), NULL", 2)
        .unwrap();
    assert_eq!(rows, vec![vec![Some("42".to_string()), None]]);
}

#[test]
fn test_query_rows_missing_table() {
    let db = trino_with_events();
    let err = db.query_rows("SELECT * FROM nowhere", 1).unwrap_err();
    assert!(matches!(err, DbError::TableNotFound(_)), "got {err:?}");
}

#[test]
fn test_latest_partition_single_column() {
    let db = trino_with_events();
    let latest = PartitionStyle::Presto
        .latest_partition(&db, "daily", None, false)
        .unwrap();
    assert_eq!(latest.first(), Some("2023-12-31"));
}

#[test]
fn test_latest_partition_multi_column_requires_flag() {
    let db = trino_with_events();
    let err = PartitionStyle::Presto
        .latest_partition(&db, "events", Some("web"), false)
        .unwrap_err();
    assert!(err.to_string().contains("latest_sub_partition"));

    let latest = PartitionStyle::Presto
        .latest_partition(&db, "events", Some("web"), true)
        .unwrap();
    assert_eq!(
        latest.values,
        Some(vec![Some("2024-01-03".to_string()), Some("2".to_string())])
    );
}

#[test]
fn test_latest_sub_partition() {
    let db = trino_with_events();
    let filters = BTreeMap::from([("ds".to_string(), "2024-01-02".to_string())]);
    let hour = PartitionStyle::Presto
        .latest_sub_partition(&db, "events", Some("web"), &filters)
        .unwrap();
    assert_eq!(hour.as_deref(), Some("7"));
}

#[test]
fn test_latest_sub_partition_no_match() {
    let db = trino_with_events();
    let filters = BTreeMap::from([("ds".to_string(), "1999-01-01".to_string())]);
    let hour = PartitionStyle::Presto
        .latest_sub_partition(&db, "events", Some("web"), &filters)
        .unwrap();
    assert_eq!(hour, None);
}

#[test]
fn test_latest_sub_partition_filter_value_is_quoted() {
    let db = trino_with_events();
    let filters = BTreeMap::from([("ds".to_string(), "x' OR '1'='1".to_string())]);
    let hour = PartitionStyle::Presto
        .latest_sub_partition(&db, "events", Some("web"), &filters)
        .unwrap();
    assert_eq!(hour, None);
}

#[test]
fn test_integer_partitions_order_numerically() {
    let db = DuckDbBackend::in_memory().unwrap().with_backend_name("presto");
    db.execute_batch(
        r#"
        CREATE TABLE "runs$partitions" (id INTEGER);
        INSERT INTO "runs$partitions" VALUES (9), (10), (2);
        CREATE TABLE "ev$partitions" (ds VARCHAR, hour INTEGER);
        INSERT INTO "ev$partitions" VALUES ('2024-01-02', 7), ('2024-01-02', 12), ('2024-01-01', 23);
        "#,
    )
    .unwrap();
    let latest = PartitionStyle::Presto
        .latest_partition(&db, "runs", None, false)
        .unwrap();
    assert_eq!(latest.first(), Some("10"));

    let filters = BTreeMap::from([("ds".to_string(), "2024-01-02".to_string())]);
    let hour = PartitionStyle::Presto
        .latest_sub_partition(&db, "ev", None, &filters)
        .unwrap();
    assert_eq!(hour.as_deref(), Some("12"));
}
