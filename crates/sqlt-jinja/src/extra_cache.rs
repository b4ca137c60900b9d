//! Per-render side effects that feed the cache key.
//!
//! Helpers record here every request-derived value that changed the
//! rendered SQL. Two renders whose snapshots are equal, over the same
//! inputs, produce the same SQL; the caller mixes the snapshot into its
//! cache key.

use regex::Regex;
use serde::Serialize;
use sqlt_core::checksum::compute_checksum_parts;
use sqlt_core::SqlDialect;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Helpers whose calls contribute to the cache key
const CACHE_KEY_HELPERS: &[&str] = &[
    "current_user_id",
    "current_username",
    "current_user_email",
    "current_user_roles",
    "current_user_rls_rules",
    "current_user_locale",
    "cache_key_wrapper",
    "url_param",
];

static CACHE_CALL_RE: OnceLock<Regex> = OnceLock::new();

fn cache_call_re() -> &'static Regex {
    CACHE_CALL_RE.get_or_init(|| {
        let helpers = CACHE_KEY_HELPERS.join("|");
        Regex::new(&format!(
            r"(\{{\{{|\{{%)[^{{}}]*?\b({helpers})\([^()]*\)[^{{}}]*?(\}}\}}|%\}})"
        ))
        .expect("valid regex")
    })
}

/// Whether `sql` calls a helper that contributes to the cache key.
///
/// Callers use this to skip rendering when only the cache key is wanted.
pub fn has_extra_cache_key_calls(sql: &str) -> bool {
    cache_call_re().is_match(sql)
}

/// The accumulator one render writes to.
#[derive(Debug, Clone, Default)]
pub struct ExtraCacheState {
    extra_cache_keys: Vec<serde_json::Value>,
    applied_filters: BTreeSet<String>,
    removed_filters: BTreeSet<String>,
    dialect: Option<SqlDialect>,
}

/// Shared handle helpers record through
pub(crate) type SharedCacheState = Arc<Mutex<ExtraCacheState>>;

/// Lock the state, recovering it if a helper panicked mid-update.
pub(crate) fn lock_state(state: &SharedCacheState) -> MutexGuard<'_, ExtraCacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ExtraCacheState {
    pub fn new(dialect: Option<SqlDialect>) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    pub fn dialect(&self) -> Option<SqlDialect> {
        self.dialect
    }

    /// Append `value` to the cache key contributions.
    ///
    /// Repeated contributions are kept; order is call order.
    pub fn note_cache_contribution(&mut self, value: serde_json::Value) {
        log::debug!("Extra cache key: {value}");
        self.extra_cache_keys.push(value);
    }

    pub fn note_applied_filter(&mut self, column: &str) {
        self.applied_filters.insert(column.to_string());
    }

    /// Mark `column` removed. A removed filter is always also applied.
    pub fn note_removed_filter(&mut self, column: &str) {
        self.applied_filters.insert(column.to_string());
        self.removed_filters.insert(column.to_string());
    }

    pub fn extra_cache_keys(&self) -> &[serde_json::Value] {
        &self.extra_cache_keys
    }

    pub fn applied_filters(&self) -> &BTreeSet<String> {
        &self.applied_filters
    }

    pub fn removed_filters(&self) -> &BTreeSet<String> {
        &self.removed_filters
    }

    pub fn snapshot(&self) -> ExtraCacheSnapshot {
        ExtraCacheSnapshot {
            extra_cache_keys: self.extra_cache_keys.clone(),
            applied_filters: self.applied_filters.clone(),
            removed_filters: self.removed_filters.clone(),
        }
    }
}

/// Read-only view of a finished render's state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtraCacheSnapshot {
    pub extra_cache_keys: Vec<serde_json::Value>,
    pub applied_filters: BTreeSet<String>,
    pub removed_filters: BTreeSet<String>,
}

impl ExtraCacheSnapshot {
    pub fn is_empty(&self) -> bool {
        self.extra_cache_keys.is_empty()
            && self.applied_filters.is_empty()
            && self.removed_filters.is_empty()
    }

    /// Derive a cache key from the caller's `base` key and this snapshot.
    ///
    /// Each section is tagged so values cannot migrate between sections
    /// without changing the digest.
    pub fn cache_key(&self, base: &str) -> String {
        let keys: Vec<String> = self
            .extra_cache_keys
            .iter()
            .map(|v| format!("key:{v}"))
            .collect();
        let applied = self.applied_filters.iter().map(|c| format!("applied:{c}"));
        let removed = self.removed_filters.iter().map(|c| format!("removed:{c}"));
        let parts: Vec<String> = std::iter::once(format!("base:{base}"))
            .chain(keys)
            .chain(applied)
            .chain(removed)
            .collect();
        compute_checksum_parts(parts.iter().map(String::as_str))
    }
}

#[cfg(test)]
#[path = "extra_cache_test.rs"]
mod tests;
