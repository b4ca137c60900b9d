//! One render: namespace, sandbox checks and the minijinja environment.
//!
//! A processor renders exactly once. Afterwards its extra-cache state is
//! read-only and further calls to [`TemplateProcessor::process_template`]
//! fail with [`TemplateError::AlreadyRendered`].

use crate::backends::{BackendExtension, BackendScope};
use crate::context::ExtraCache;
use crate::error::{SandboxViolation, TemplateError, TemplateResult, ViolationCategory};
use crate::extra_cache::ExtraCacheSnapshot;
use crate::filters::{make_sqljoin_filter, make_where_in_filter};
use crate::namespace::{Bindings, Layer, Namespace};
use crate::sandbox::{check_template, BUILTIN_GLOBALS};
use crate::values::take_hidden_key_read;
use minijinja::value::Value;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use sqlt_core::SqlDialect;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// The table a query targets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableContext {
    pub table_name: String,
    pub schema: Option<String>,
}

impl TableContext {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// The saved or ad-hoc query being rendered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    pub schema: Option<String>,
}

impl QueryContext {
    pub fn with_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
        }
    }
}

/// Lifecycle of a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Ready,
    Rendered,
    Failed,
}

/// Renders one template for one request.
pub struct TemplateProcessor {
    backend: String,
    enabled: bool,
    fuel: Option<u64>,
    dialect: SqlDialect,
    namespace: Namespace,
    extension: Option<Arc<dyn BackendExtension>>,
    scope: BackendScope,
    cache: ExtraCache,
    state: ProcessorState,
}

pub(crate) struct ProcessorParts {
    pub backend: String,
    pub enabled: bool,
    pub fuel: Option<u64>,
    pub dialect: SqlDialect,
    pub namespace: Namespace,
    pub extension: Option<Arc<dyn BackendExtension>>,
    pub scope: BackendScope,
    pub cache: ExtraCache,
}

impl TemplateProcessor {
    pub(crate) fn from_parts(parts: ProcessorParts) -> Self {
        Self {
            backend: parts.backend,
            enabled: parts.enabled,
            fuel: parts.fuel,
            dialect: parts.dialect,
            namespace: parts.namespace,
            extension: parts.extension,
            scope: parts.scope,
            cache: parts.cache,
            state: ProcessorState::Ready,
        }
    }

    /// Render `sql` with `bindings` layered over the processor's namespace.
    ///
    /// With template processing disabled the input is returned unchanged.
    /// On any error no output is produced and the processor is spent.
    pub fn process_template(&mut self, sql: &str, bindings: Bindings) -> TemplateResult<String> {
        if !self.enabled {
            self.begin()?;
            self.state = ProcessorState::Rendered;
            return Ok(sql.to_string());
        }
        self.run(|p| p.render(sql, bindings))
    }

    /// Evaluate a single expression (`url_param('x') or 'y'`) to a value.
    ///
    /// Shares the sandbox rules and the one-shot lifecycle of
    /// [`TemplateProcessor::process_template`]. With template processing
    /// disabled the expression text comes back as a string.
    pub fn evaluate_expression(&mut self, expr: &str, bindings: Bindings) -> TemplateResult<Value> {
        if !self.enabled {
            self.begin()?;
            self.state = ProcessorState::Rendered;
            return Ok(Value::from(expr));
        }
        self.run(|p| p.evaluate(expr, bindings))
    }

    fn begin(&self) -> TemplateResult<()> {
        match self.state {
            ProcessorState::Ready => Ok(()),
            _ => Err(TemplateError::AlreadyRendered),
        }
    }

    /// Run `f` once; a read of a hidden map key fails the whole render.
    fn run<T>(&mut self, f: impl FnOnce(&Self) -> TemplateResult<T>) -> TemplateResult<T> {
        self.begin()?;
        take_hidden_key_read();
        let mut result = f(self);
        if take_hidden_key_read() {
            result = Err(SandboxViolation::new(ViolationCategory::PrivateAttribute).into());
        }
        match result {
            Ok(out) => {
                self.state = ProcessorState::Rendered;
                Ok(out)
            }
            Err(e) => {
                self.state = ProcessorState::Failed;
                if let Some(category) = e.violation_category() {
                    log::warn!("Template rejected by sandbox: {category}");
                }
                Err(e)
            }
        }
    }

    /// Preprocess and sandbox-check `source`, then build the environment.
    fn prepare(
        &self,
        source: &str,
        bindings: Bindings,
    ) -> TemplateResult<(String, Namespace, Environment<'static>)> {
        bindings.validate()?;

        let source = match &self.extension {
            Some(ext) => ext.preprocess(source, &self.scope)?,
            None => source.to_string(),
        };

        let mut namespace = self.namespace.clone();
        namespace.push_layer(Layer::Bindings, bindings.into_entries());

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        env.set_fuel(self.fuel);
        env.add_filter("sqljoin", make_sqljoin_filter(self.dialect));
        env.add_filter("where_in", make_where_in_filter(self.dialect));
        for (name, value) in namespace.iter() {
            env.add_global(name.to_string(), value.clone());
        }
        Ok((source, namespace, env))
    }

    fn render(&self, sql: &str, bindings: Bindings) -> TemplateResult<String> {
        let (source, namespace, env) = self.prepare(sql, bindings)?;
        check_template(&source)?;

        let template = env.template_from_str(&source)?;
        check_declared(&namespace, template.undeclared_variables(false))?;

        log::debug!("Rendering template for backend {}", self.backend);
        Ok(template.render(())?)
    }

    fn evaluate(&self, expr: &str, bindings: Bindings) -> TemplateResult<Value> {
        let (source, namespace, env) = self.prepare(expr, bindings)?;
        check_template(&format!("{{{{ {source} }}}}"))?;

        let expression = env.compile_expression(&source)?;
        check_declared(&namespace, expression.undeclared_variables(false))?;

        log::debug!("Evaluating expression for backend {}", self.backend);
        Ok(expression.eval(())?)
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    /// Names visible to templates before per-call bindings
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn extra_cache_keys(&self) -> Vec<serde_json::Value> {
        self.cache.snapshot().extra_cache_keys
    }

    pub fn applied_filters(&self) -> BTreeSet<String> {
        self.cache.snapshot().applied_filters
    }

    pub fn removed_filters(&self) -> BTreeSet<String> {
        self.cache.snapshot().removed_filters
    }

    pub fn snapshot(&self) -> ExtraCacheSnapshot {
        self.cache.snapshot()
    }
}

/// Fail on the first (sorted) name that is neither in the namespace nor a builtin.
fn check_declared(namespace: &Namespace, names: HashSet<String>) -> TemplateResult<()> {
    let mut undeclared: Vec<String> = names
        .into_iter()
        .filter(|name| !namespace.contains(name) && !BUILTIN_GLOBALS.contains(&name.as_str()))
        .collect();
    undeclared.sort();
    match undeclared.into_iter().next() {
        Some(name) => Err(TemplateError::UndefinedName { name }),
        None => Ok(()),
    }
}

#[cfg(test)]
#[path = "processor_test.rs"]
mod tests;
