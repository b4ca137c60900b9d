use super::*;
use crate::traits::Row;
use std::sync::Mutex;

/// Answers `SHOW PARTITIONS` with a fixed listing and records every query.
struct FakeHive {
    columns: Vec<String>,
    partitions: Vec<&'static str>,
    queries: Mutex<Vec<String>>,
}

impl FakeHive {
    fn new(columns: &[&str], partitions: Vec<&'static str>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            partitions,
            queries: Mutex::new(Vec::new()),
        }
    }
}

impl Database for FakeHive {
    fn backend(&self) -> &str {
        "hive"
    }

    fn partition_columns(&self, _table: &str, _schema: Option<&str>) -> DbResult<Vec<String>> {
        Ok(self.columns.clone())
    }

    fn query_rows(&self, sql: &str, width: usize) -> DbResult<Vec<Row>> {
        assert_eq!(width, 1);
        self.queries.lock().unwrap().push(sql.to_string());
        Ok(self
            .partitions
            .iter()
            .map(|p| vec![Some(p.to_string())])
            .collect())
    }
}

#[test]
fn test_presto_query_shape() {
    let sql = PartitionStyle::Presto.partition_query(
        "events",
        Some("web"),
        &["ds".to_string(), "hour".to_string()],
        &BTreeMap::from([("ds".to_string(), "2024-01-01".to_string())]),
    );
    assert_eq!(
        sql,
        r#"SELECT CAST("ds" AS VARCHAR), CAST("hour" AS VARCHAR) FROM "web"."events$partitions" WHERE "ds" = '2024-01-01' ORDER BY "ds" DESC, "hour" DESC LIMIT 1"#
    );
}

#[test]
fn test_hive_query_shape() {
    let sql = PartitionStyle::Hive.partition_query(
        "events",
        Some("web"),
        &[],
        &BTreeMap::from([("ds".to_string(), "it's".to_string())]),
    );
    assert_eq!(sql, r"SHOW PARTITIONS `web`.`events` PARTITION (`ds`='it\'s')");
}

#[test]
fn test_parse_partition_spec() {
    let parsed = parse_partition_spec("ds=2024-01-01/hour=12");
    assert_eq!(parsed.get("ds").map(String::as_str), Some("2024-01-01"));
    assert_eq!(parsed.get("hour").map(String::as_str), Some("12"));
    assert!(parse_partition_spec("garbage").is_empty());
}

#[test]
fn test_hive_latest_partition() {
    let db = FakeHive::new(&["ds"], vec!["ds=2024-01-01", "ds=2024-01-03", "ds=2024-01-02"]);
    let latest = PartitionStyle::Hive
        .latest_partition(&db, "logs", None, false)
        .unwrap();
    assert_eq!(latest.first(), Some("2024-01-03"));
    assert_eq!(db.queries.lock().unwrap()[0], "SHOW PARTITIONS `logs`");
}

#[test]
fn test_hive_latest_partition_empty_table() {
    let db = FakeHive::new(&["ds"], vec![]);
    let latest = PartitionStyle::Hive
        .latest_partition(&db, "logs", None, false)
        .unwrap();
    assert_eq!(latest.values, None);
    assert_eq!(latest.first(), None);
}

#[test]
fn test_hive_latest_sub_partition() {
    let db = FakeHive::new(
        &["ds", "hour"],
        vec!["ds=2024-01-01/hour=09", "ds=2024-01-02/hour=05", "ds=2024-01-01/hour=11"],
    );
    let filters = BTreeMap::from([("ds".to_string(), "2024-01-01".to_string())]);
    let hour = PartitionStyle::Hive
        .latest_sub_partition(&db, "logs", Some("raw"), &filters)
        .unwrap();
    assert_eq!(hour.as_deref(), Some("11"));
}

#[test]
fn test_not_partitioned() {
    let db = FakeHive::new(&[], vec![]);
    let err = PartitionStyle::Hive
        .latest_partition(&db, "plain", None, false)
        .unwrap_err();
    assert!(matches!(err, DbError::NotPartitioned(t) if t == "plain"));
}

#[test]
fn test_sub_partition_unknown_field() {
    let db = FakeHive::new(&["ds", "hour"], vec![]);
    let filters = BTreeMap::from([("region".to_string(), "eu".to_string())]);
    let err = PartitionStyle::Presto
        .latest_sub_partition(&db, "logs", None, &filters)
        .unwrap_err();
    assert_eq!(err.to_string(), "[D005] Field [region] is not part of the partitioning key");
}

#[test]
fn test_sub_partition_wrong_filter_count() {
    let db = FakeHive::new(&["ds", "hour", "minute"], vec![]);
    let filters = BTreeMap::from([("ds".to_string(), "2024-01-01".to_string())]);
    let err = PartitionStyle::Hive
        .latest_sub_partition(&db, "logs", None, &filters)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "[D005] A filter needs to be specified for 2 out of the 3 fields."
    );
}

#[test]
fn test_hive_numeric_partition_values() {
    let db = FakeHive::new(
        &["ds", "hour"],
        vec!["ds=2024-01-02/hour=7", "ds=2024-01-02/hour=12", "ds=2024-01-01/hour=23"],
    );
    let filters = BTreeMap::from([("ds".to_string(), "2024-01-02".to_string())]);
    let hour = PartitionStyle::Hive
        .latest_sub_partition(&db, "logs", None, &filters)
        .unwrap();
    assert_eq!(hour.as_deref(), Some("12"));

    let latest = PartitionStyle::Hive
        .latest_partition(&db, "logs", None, true)
        .unwrap();
    assert_eq!(
        latest.values,
        Some(vec![Some("2024-01-02".to_string()), Some("12".to_string())])
    );
}
