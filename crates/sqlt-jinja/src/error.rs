//! Error types for sqlt-jinja

use sqlt_db::DbError;
use std::fmt;
use thiserror::Error;

/// Stable tag identifying what a rejected template tried to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationCategory {
    /// `lambda`, `def`, `{% macro %}` or `{% call %}`
    CallableConstruction,
    /// `{% import %}`, `{% include %}`, `__import__` and friends
    ModuleImport,
    /// A dunder name such as `__builtins__`
    PrivateName,
    /// Attribute or item access on a key starting with `_`
    PrivateAttribute,
    /// A mutating method such as `.append(...)`
    MutatingCall,
    /// `debug()`, `eval()`, `getattr()` and similar reflection
    Introspection,
    /// A helper received a callable that is not a safe proxy
    CallableArgument,
    /// A helper argument nested deeper than the walker allows
    NestingLimit,
}

impl ViolationCategory {
    /// The snake_case tag used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationCategory::CallableConstruction => "callable_construction",
            ViolationCategory::ModuleImport => "module_import",
            ViolationCategory::PrivateName => "private_name",
            ViolationCategory::PrivateAttribute => "private_attribute",
            ViolationCategory::MutatingCall => "mutating_call",
            ViolationCategory::Introspection => "introspection",
            ViolationCategory::CallableArgument => "callable_argument",
            ViolationCategory::NestingLimit => "nesting_limit",
        }
    }
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected sandbox escape.
///
/// Only the category and location are kept; the offending expression text
/// never appears in the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxViolation {
    pub category: ViolationCategory,
    pub line: Option<usize>,
}

impl SandboxViolation {
    pub fn new(category: ViolationCategory) -> Self {
        Self {
            category,
            line: None,
        }
    }

    pub fn at_line(category: ViolationCategory, line: usize) -> Self {
        Self {
            category,
            line: Some(line),
        }
    }
}

impl fmt::Display for SandboxViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "sandbox violation ({}) at line {}", self.category, line),
            None => write!(f, "sandbox violation ({})", self.category),
        }
    }
}

impl std::error::Error for SandboxViolation {}

/// What made a backend helper fail
#[derive(Error, Debug, Clone)]
pub enum BackendFailure {
    /// The table exists but has no partitions
    #[error("no partition found for table {table}")]
    NoPartition { table: String },

    /// Metadata query failed
    #[error(transparent)]
    Db(#[from] DbError),
}

/// A backend helper call that failed, with the call that caused it
#[derive(Error, Debug, Clone)]
#[error("{helper}({args}) failed: {source}")]
pub struct BackendError {
    /// Fully qualified helper name, e.g. `presto.latest_partition`
    pub helper: String,
    /// Rendered argument list
    pub args: String,
    pub source: BackendFailure,
}

/// A standard helper rejected its input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{helper}: {message}")]
pub struct HelperError {
    pub helper: String,
    pub message: String,
}

impl HelperError {
    pub fn new(helper: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
            message: message.into(),
        }
    }
}

/// Template processing errors
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Template failed to parse (T001)
    #[error("[T001] Template syntax error{}: {message}", location(.name, .line))]
    Syntax {
        message: String,
        name: Option<String>,
        line: Option<usize>,
    },

    /// Expression named something the namespace does not define (T002)
    #[error("[T002] '{name}' is undefined")]
    UndefinedName { name: String },

    /// Evaluation failed (T003)
    #[error("[T003] Template render error: {0}")]
    Render(String),

    /// Sandbox escape attempted (S001)
    #[error("[S001] {0}")]
    Sandbox(#[from] SandboxViolation),

    /// Backend helper failed (B001)
    #[error("[B001] {0}")]
    Backend(#[from] BackendError),

    /// Standard helper rejected its input (T004)
    #[error("[T004] {0}")]
    Helper(#[from] HelperError),

    /// Processor already produced its output (T005)
    #[error("[T005] Template processor has already rendered; create a new processor per render")]
    AlreadyRendered,

    /// Runtime could not be built (T006)
    #[error("[T006] Invalid template runtime configuration: {0}")]
    Config(#[from] sqlt_core::CoreError),
}

/// Result type alias for TemplateError
pub type TemplateResult<T> = Result<T, TemplateError>;

fn location(name: &Option<String>, line: &Option<usize>) -> String {
    match (name, line) {
        (Some(name), Some(line)) => format!(" in {name} at line {line}"),
        (None, Some(line)) => format!(" at line {line}"),
        (Some(name), None) => format!(" in {name}"),
        (None, None) => String::new(),
    }
}

impl TemplateError {
    /// Stable category tag for security errors
    pub fn violation_category(&self) -> Option<ViolationCategory> {
        match self {
            TemplateError::Sandbox(v) => Some(v.category),
            _ => None,
        }
    }
}

impl From<minijinja::Error> for TemplateError {
    /// Classify a render failure.
    ///
    /// Helper errors travel through minijinja as the error's source, so the
    /// chain is searched for one of ours before falling back on the kind.
    fn from(err: minijinja::Error) -> Self {
        let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(&err);
        while let Some(cause) = source {
            if let Some(v) = cause.downcast_ref::<SandboxViolation>() {
                return TemplateError::Sandbox(v.clone());
            }
            if let Some(b) = cause.downcast_ref::<BackendError>() {
                return TemplateError::Backend(b.clone());
            }
            if let Some(h) = cause.downcast_ref::<HelperError>() {
                return TemplateError::Helper(h.clone());
            }
            source = cause.source();
        }

        match err.kind() {
            minijinja::ErrorKind::SyntaxError => TemplateError::Syntax {
                message: err.detail().unwrap_or("invalid syntax").to_string(),
                name: err.name().map(String::from),
                line: err.line(),
            },
            _ => TemplateError::Render(err.to_string()),
        }
    }
}

/// Wrap one of our errors so it survives a trip through minijinja.
pub(crate) fn into_minijinja<E>(err: E) -> minijinja::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, err.to_string()).with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_message_has_tag_only() {
        let err = TemplateError::from(SandboxViolation::at_line(
            ViolationCategory::PrivateAttribute,
            3,
        ));
        assert_eq!(
            err.to_string(),
            "[S001] sandbox violation (private_attribute) at line 3"
        );
        assert_eq!(
            err.violation_category(),
            Some(ViolationCategory::PrivateAttribute)
        );
    }

    #[test]
    fn test_classify_wrapped_helper_error() {
        let wrapped = into_minijinja(HelperError::new("metric", "Dataset ID 7 not found."));
        let err = TemplateError::from(wrapped);
        assert!(matches!(err, TemplateError::Helper(ref h) if h.helper == "metric"));
        assert_eq!(err.to_string(), "[T004] metric: Dataset ID 7 not found.");
    }

    #[test]
    fn test_classify_wrapped_backend_error() {
        let wrapped = into_minijinja(BackendError {
            helper: "presto.latest_partition".to_string(),
            args: "'sales'".to_string(),
            source: BackendFailure::NoPartition {
                table: "sales".to_string(),
            },
        });
        match TemplateError::from(wrapped) {
            TemplateError::Backend(b) => {
                assert_eq!(b.helper, "presto.latest_partition");
                assert!(matches!(b.source, BackendFailure::NoPartition { .. }));
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[test]
    fn test_syntax_location() {
        let err = TemplateError::Syntax {
            message: "unexpected end of input".to_string(),
            name: None,
            line: Some(2),
        };
        assert_eq!(
            err.to_string(),
            "[T001] Template syntax error at line 2: unexpected end of input"
        );
    }
}
