//! Presto and Trino helpers, read from the `"table$partitions"` metadata table

use super::{aliased_entries, BackendExtension, BackendScope};
use minijinja::value::Value;
use sqlt_db::PartitionStyle;

/// `presto.*` helpers; a Trino extension also exposes them as `trino.*`.
#[derive(Debug, Clone)]
pub struct PrestoExtension {
    engine: &'static str,
    names: &'static [&'static str],
}

impl PrestoExtension {
    pub fn presto() -> Self {
        Self {
            engine: "presto",
            names: &["presto"],
        }
    }

    pub fn trino() -> Self {
        Self {
            engine: "trino",
            names: &["trino", "presto"],
        }
    }
}

impl BackendExtension for PrestoExtension {
    fn name(&self) -> &str {
        self.engine
    }

    fn entries(&self, scope: &BackendScope) -> Vec<(String, Value)> {
        aliased_entries(self.names, PartitionStyle::Presto, scope)
    }
}
