//! sqlt-jinja - sandboxed SQL template processing
//!
//! A [`TemplateRuntime`] is built once from [`sqlt_core::TemplateConfig`]
//! plus programmatic registrations. Each render asks it for a
//! [`TemplateProcessor`] bound to a database, the request's
//! [`sqlt_core::RenderInputs`] and optional table/query context:
//!
//! ```ignore
//! let mut processor = runtime.get_template_processor(db, inputs, None, None, Bindings::new())?;
//! let sql = processor.process_template("SELECT '{{ url_param(\"foo\") }}'", Bindings::new())?;
//! let cache_key = processor.snapshot().cache_key(&base_key);
//! ```
//!
//! Templates see the standard helpers (`url_param`, `filter_values`,
//! `get_filters`, `current_user_*`, `cache_key_wrapper`), the `datetime`,
//! `relativedelta`, `timedelta`, `time`, `uuid` and `random` modules, the
//! `sqljoin` and `where_in` filters, installer addons, and backend helpers
//! such as `presto.latest_partition`.

pub mod backends;
pub mod catalog;
pub mod context;
pub mod datetime;
pub mod error;
pub mod extra_cache;
mod filters;
pub mod modules;
pub mod namespace;
pub mod processor;
pub mod proxy;
pub mod rls;
pub mod runtime;
pub mod sandbox;
mod values;

pub use backends::{BackendExtension, BackendScope, HiveExtension, PrestoExtension};
pub use catalog::{DatasetInfo, SemanticCatalog};
pub use context::{ExtraCache, LocaleSettings};
pub use error::{
    BackendError, BackendFailure, HelperError, SandboxViolation, TemplateError, TemplateResult,
    ViolationCategory,
};
pub use extra_cache::{has_extra_cache_key_calls, ExtraCacheSnapshot, ExtraCacheState};
pub use namespace::{Bindings, Layer, Namespace};
pub use processor::{ProcessorState, QueryContext, TableContext, TemplateProcessor};
pub use proxy::{HelperNamespace, SafeProxy};
pub use rls::{render_rls_predicates, RlsPredicates};
pub use runtime::{TemplateRuntime, TemplateRuntimeBuilder};
pub use sandbox::check_template;
