//! sqlt-core - shared types for the sqlt template processing core
//!
//! This crate holds the data the template processor consumes but does not
//! own: request-derived [`RenderInputs`], form-data filters, SQL dialect
//! literal quoting, row-level-security filter composition and the
//! installer-facing [`TemplateConfig`].

pub mod checksum;
pub mod config;
pub mod dialect;
pub mod error;
pub mod filter;
pub mod form_data;
pub mod request;
pub mod rls;
pub mod sql_utils;

pub use config::TemplateConfig;
pub use dialect::SqlDialect;
pub use error::{CoreError, CoreResult};
pub use filter::{FilterDescriptor, FilterOperator};
pub use form_data::{AdhocFilter, ExtraFilter, FormData};
pub use request::{Lookup, RenderInputs, UserIdentity};
pub use rls::RowLevelFilter;
