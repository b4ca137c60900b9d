//! SQL dialects and their string-literal quoting rules.
//!
//! Only literal quoting lives here: the template core never parses SQL, it
//! only has to produce literals the target engine reads back verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Target SQL flavor, as far as literal quoting is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// ANSI behaviour: single quotes doubled, backslash is literal
    #[default]
    Ansi,
    Postgres,
    /// Single quotes doubled, backslashes escaped
    MySql,
    Sqlite,
    DuckDb,
    Presto,
    Trino,
    /// Backslash escapes for both quotes and backslashes
    Hive,
    Spark,
    BigQuery,
}

impl SqlDialect {
    /// Best-effort mapping from a backend identifier to its dialect.
    pub fn from_backend(backend: &str) -> Self {
        match backend.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "redshift" => SqlDialect::Postgres,
            "mysql" | "mariadb" => SqlDialect::MySql,
            "sqlite" => SqlDialect::Sqlite,
            "duckdb" => SqlDialect::DuckDb,
            "presto" => SqlDialect::Presto,
            "trino" => SqlDialect::Trino,
            "hive" => SqlDialect::Hive,
            "spark" | "databricks" => SqlDialect::Spark,
            "bigquery" => SqlDialect::BigQuery,
            _ => SqlDialect::Ansi,
        }
    }

    /// Escape `value` so it can sit between single quotes.
    ///
    /// The outer quotes are not added; see [`SqlDialect::quote_literal`].
    pub fn escape_literal(&self, value: &str) -> String {
        match self {
            SqlDialect::MySql => value.replace('\\', "\\\\").replace('\'', "''"),
            SqlDialect::Hive | SqlDialect::Spark | SqlDialect::BigQuery => {
                value.replace('\\', "\\\\").replace('\'', "\\'")
            }
            _ => value.replace('\'', "''"),
        }
    }

    /// Render `value` as a complete single-quoted string literal.
    pub fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", self.escape_literal(value))
    }

    /// Render a JSON value as a SQL literal.
    ///
    /// Nulls become `NULL`, numbers and booleans are emitted bare, strings are
    /// quoted, and nested arrays become a `, `-joined list.
    pub fn render_literal(&self, value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::Null => "NULL".to_string(),
            serde_json::Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => self.quote_literal(s),
            serde_json::Value::Array(items) => self.render_list(items),
            serde_json::Value::Object(_) => self.quote_literal(&value.to_string()),
        }
    }

    /// Render a sequence of values as a `, `-joined literal list.
    pub fn render_list(&self, values: &[serde_json::Value]) -> String {
        values
            .iter()
            .map(|v| self.render_literal(v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlDialect::Ansi => "ansi",
            SqlDialect::Postgres => "postgres",
            SqlDialect::MySql => "mysql",
            SqlDialect::Sqlite => "sqlite",
            SqlDialect::DuckDb => "duckdb",
            SqlDialect::Presto => "presto",
            SqlDialect::Trino => "trino",
            SqlDialect::Hive => "hive",
            SqlDialect::Spark => "spark",
            SqlDialect::BigQuery => "bigquery",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
