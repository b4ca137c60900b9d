//! Process-wide template runtime and the processor factory.
//!
//! [`TemplateRuntimeBuilder`] collects everything an installer configures
//! at startup: the [`TemplateConfig`], callable and data addons, custom
//! backend extensions and the semantic catalog. The built
//! [`TemplateRuntime`] is immutable and can be shared across threads; each
//! render asks it for a fresh [`TemplateProcessor`].

use crate::backends::{builtin_extension, BackendExtension, BackendScope};
use crate::catalog::{make_dataset_fn, make_metric_fn, SemanticCatalog};
use crate::context::{ExtraCache, LocaleSettings};
use crate::error::TemplateResult;
use crate::namespace::{context_entries, module_entries, Bindings, Layer, Namespace};
use crate::processor::{ProcessorParts, QueryContext, TableContext, TemplateProcessor};
use crate::proxy::{validate_value, SafeProxy};
use crate::values::{guard_value, json_to_value};
use minijinja::value::Value;
use sqlt_core::config::is_identifier;
use sqlt_core::{CoreError, RenderInputs, TemplateConfig};
use sqlt_db::Database;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builder for [`TemplateRuntime`]
pub struct TemplateRuntimeBuilder {
    config: TemplateConfig,
    addons: Vec<(String, Value)>,
    custom: BTreeMap<String, Arc<dyn BackendExtension>>,
    catalog: Option<Arc<dyn SemanticCatalog>>,
}

impl TemplateRuntimeBuilder {
    pub fn new(config: TemplateConfig) -> Self {
        Self {
            config,
            addons: Vec::new(),
            custom: BTreeMap::new(),
            catalog: None,
        }
    }

    /// Add a callable addon. The function is wrapped in a safe proxy.
    pub fn addon_function(mut self, name: impl Into<String>, function: Value) -> Self {
        let name = name.into();
        let proxy = SafeProxy::wrap(name.clone(), function);
        self.addons.push((name, proxy));
        self
    }

    /// Add a data addon.
    pub fn addon_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.addons.push((name.into(), value));
        self
    }

    /// Register a custom extension for `backend`. It takes precedence over
    /// the built-in extension of the same name.
    pub fn custom_processor(
        mut self,
        backend: impl Into<String>,
        extension: Arc<dyn BackendExtension>,
    ) -> Self {
        self.custom.insert(backend.into().to_ascii_lowercase(), extension);
        self
    }

    /// Enable `metric()` and `dataset()` over `catalog`.
    pub fn catalog(mut self, catalog: Arc<dyn SemanticCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> TemplateResult<TemplateRuntime> {
        self.config.validate()?;

        let mut addons: Vec<(String, Value)> = self
            .config
            .jinja_context_addons
            .iter()
            .map(|(name, value)| (name.clone(), json_to_value(value)))
            .collect();
        addons.extend(self.addons);
        if let Some((name, _)) = addons.iter().find(|(name, _)| !is_identifier(name)) {
            return Err(CoreError::ConfigInvalid {
                message: format!("context addon '{name}' is not a valid identifier"),
            }
            .into());
        }
        if let Some((name, _)) = addons.iter().find(|(_, value)| validate_value(value, 0).is_err()) {
            log::warn!("Refusing context addon '{name}'");
            return Err(CoreError::ConfigInvalid {
                message: format!("context addon '{name}' must be data or a registered function"),
            }
            .into());
        }
        let addons: Vec<(String, Value)> = addons
            .into_iter()
            .map(|(name, value)| (name, guard_value(value)))
            .collect();

        let locale = Arc::new(LocaleSettings {
            default_locale: self.config.babel_default_locale.clone(),
            supported: self.config.languages.clone(),
        });
        log::debug!(
            "Template runtime: {} addons, custom backends {:?}",
            addons.len(),
            self.custom.keys().collect::<Vec<_>>()
        );

        Ok(TemplateRuntime {
            config: self.config,
            modules: module_entries(),
            addons,
            custom: self.custom,
            catalog: self.catalog,
            locale,
        })
    }
}

/// Shared, read-only template runtime
pub struct TemplateRuntime {
    config: TemplateConfig,
    modules: Vec<(String, Value)>,
    addons: Vec<(String, Value)>,
    custom: BTreeMap<String, Arc<dyn BackendExtension>>,
    catalog: Option<Arc<dyn SemanticCatalog>>,
    locale: Arc<LocaleSettings>,
}

impl TemplateRuntime {
    pub fn builder(config: TemplateConfig) -> TemplateRuntimeBuilder {
        TemplateRuntimeBuilder::new(config)
    }

    /// A runtime with only configuration, no programmatic registrations
    pub fn from_config(config: TemplateConfig) -> TemplateResult<Self> {
        TemplateRuntimeBuilder::new(config).build()
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// The extension serving `backend`: custom, then built-in.
    pub fn extension_for(&self, backend: &str) -> Option<Arc<dyn BackendExtension>> {
        let key = backend.to_ascii_lowercase();
        if let Some(ext) = self.custom.get(&key) {
            log::debug!("Backend {backend}: custom extension {}", ext.name());
            return Some(ext.clone());
        }
        let builtin = builtin_extension(&key);
        match &builtin {
            Some(ext) => log::debug!("Backend {backend}: built-in extension {}", ext.name()),
            None => log::debug!("Backend {backend}: base processor"),
        }
        builtin
    }

    /// Create the processor for one render against `database`.
    ///
    /// Unqualified table names in backend helpers are resolved in the
    /// query's schema, else the table's.
    pub fn get_template_processor(
        &self,
        database: Arc<dyn Database>,
        inputs: RenderInputs,
        table: Option<&TableContext>,
        query: Option<&QueryContext>,
        bindings: Bindings,
    ) -> TemplateResult<TemplateProcessor> {
        bindings.validate()?;

        let backend = database.backend().to_string();
        let dialect = database.dialect();
        let cache = ExtraCache::new(Arc::new(inputs), Some(dialect), self.locale.clone());
        let scope = BackendScope {
            database,
            default_schema: query
                .and_then(|q| q.schema.clone())
                .or_else(|| table.and_then(|t| t.schema.clone())),
            cache: cache.clone(),
        };

        let mut namespace = Namespace::new();
        namespace.push_layer(Layer::Base, self.modules.iter().cloned());
        namespace.push_layer(Layer::Base, context_entries(&cache));
        if let Some(catalog) = &self.catalog {
            namespace.push_layer(
                Layer::Base,
                vec![
                    (
                        "metric".to_string(),
                        SafeProxy::wrap(
                            "metric",
                            Value::from_function(make_metric_fn(catalog.clone(), cache.clone())),
                        ),
                    ),
                    (
                        "dataset".to_string(),
                        SafeProxy::wrap("dataset", Value::from_function(make_dataset_fn(catalog.clone()))),
                    ),
                ],
            );
        }
        namespace.push_layer(Layer::Addons, self.addons.iter().cloned());

        let extension = self.extension_for(&backend);
        if let Some(ext) = &extension {
            namespace.push_layer(Layer::Backend, ext.entries(&scope));
        }
        namespace.push_layer(Layer::Bindings, bindings.into_entries());

        Ok(TemplateProcessor::from_parts(ProcessorParts {
            backend,
            enabled: self.config.enable_template_processing,
            fuel: self.config.template_fuel,
            dialect,
            namespace,
            extension,
            scope,
            cache,
        }))
    }
}

#[cfg(test)]
#[path = "runtime_test.rs"]
mod tests;
