//! Hive and Spark helpers, read from `SHOW PARTITIONS`

use super::{aliased_entries, BackendExtension, BackendScope};
use minijinja::value::Value;
use sqlt_db::PartitionStyle;

/// `hive.*` helpers; a Spark extension also exposes them as `spark.*`.
#[derive(Debug, Clone)]
pub struct HiveExtension {
    engine: &'static str,
    names: &'static [&'static str],
}

impl HiveExtension {
    pub fn hive() -> Self {
        Self {
            engine: "hive",
            names: &["hive"],
        }
    }

    pub fn spark() -> Self {
        Self {
            engine: "spark",
            names: &["spark", "hive"],
        }
    }
}

impl BackendExtension for HiveExtension {
    fn name(&self) -> &str {
        self.engine
    }

    fn entries(&self, scope: &BackendScope) -> Vec<(String, Value)> {
        aliased_entries(self.names, PartitionStyle::Hive, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExtraCache, LocaleSettings};
    use crate::error::TemplateError;
    use sqlt_core::RenderInputs;
    use sqlt_db::{Database, DbResult, Row};
    use std::sync::{Arc, Mutex};

    /// Answers `SHOW PARTITIONS` with a fixed listing
    struct FakeSpark {
        queries: Mutex<Vec<String>>,
    }

    impl Database for FakeSpark {
        fn backend(&self) -> &str {
            "spark"
        }

        fn partition_columns(&self, _table: &str, _schema: Option<&str>) -> DbResult<Vec<String>> {
            Ok(vec!["ds".to_string(), "hour".to_string()])
        }

        fn query_rows(&self, sql: &str, _width: usize) -> DbResult<Vec<Row>> {
            self.queries.lock().unwrap().push(sql.to_string());
            let rows = ["ds=2024-01-01/hour=05", "ds=2024-01-02/hour=01", "ds=2024-01-01/hour=09"];
            Ok(rows.iter().map(|r| vec![Some(r.to_string())]).collect())
        }
    }

    fn render(source: &str) -> (Result<String, TemplateError>, Vec<String>) {
        let fake = Arc::new(FakeSpark {
            queries: Mutex::new(Vec::new()),
        });
        let scope = BackendScope {
            database: fake.clone(),
            default_schema: Some("logs".to_string()),
            cache: ExtraCache::new(Arc::new(RenderInputs::new()), None, Arc::new(LocaleSettings::default())),
        };
        let mut env = minijinja::Environment::new();
        for (name, value) in HiveExtension::spark().entries(&scope) {
            env.add_global(name, value);
        }
        let result = env.render_str(source, ()).map_err(TemplateError::from);
        let queries = fake.queries.lock().unwrap().clone();
        (result, queries)
    }

    #[test]
    fn test_spark_answers_hive_name() {
        let (spark, queries) = render("{{ spark.latest_partition('events') }}");
        assert_eq!(spark.unwrap(), "2024-01-02");
        assert_eq!(queries, vec!["SHOW PARTITIONS `logs`.`events`".to_string()]);

        let (hive, _) = render("{{ hive.latest_partition('events') }}");
        assert_eq!(hive.unwrap(), "2024-01-02");
    }

    #[test]
    fn test_sub_partition_filters_rows() {
        let (result, queries) = render("{{ hive.latest_sub_partition('web.events', ds='2024-01-01') }}");
        assert_eq!(result.unwrap(), "09");
        assert_eq!(
            queries,
            vec!["SHOW PARTITIONS `web`.`events` PARTITION (`ds`='2024-01-01')".to_string()]
        );
    }

    #[test]
    fn test_sub_partition_needs_n_minus_one_filters() {
        let (result, _) = render("{{ hive.latest_sub_partition('events') }}");
        let err = result.unwrap_err();
        match &err {
            TemplateError::Backend(e) => assert_eq!(e.helper, "hive.latest_sub_partition"),
            other => panic!("expected a backend error, got {other:?}"),
        }
        assert!(err
            .to_string()
            .contains("A filter needs to be specified for 1 out of the 2 fields."));
    }
}
