//! Request-derived inputs for one render.
//!
//! The processor never reaches for an ambient request: everything a helper
//! may read is captured here by the caller and handed to the factory.

use crate::error::CoreResult;
use crate::form_data::FormData;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of reading an optional request input.
///
/// Helpers collapse this to their neutral default only at their own
/// boundary, so malformed input is visible up to that point.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Lookup<T> {
    Found(T),
    #[default]
    Missing,
    Invalid(String),
}

impl<T> Lookup<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Lookup::Found(v),
            None => Lookup::Missing,
        }
    }

    pub fn as_ref(&self) -> Lookup<&T> {
        match self {
            Lookup::Found(v) => Lookup::Found(v),
            Lookup::Missing => Lookup::Missing,
            Lookup::Invalid(reason) => Lookup::Invalid(reason.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(v) => Lookup::Found(f(v)),
            Lookup::Missing => Lookup::Missing,
            Lookup::Invalid(reason) => Lookup::Invalid(reason),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Lookup<U>) -> Lookup<U> {
        match self {
            Lookup::Found(v) => f(v),
            Lookup::Missing => Lookup::Missing,
            Lookup::Invalid(reason) => Lookup::Invalid(reason),
        }
    }

    /// Try `f` only when nothing was found; invalid input is not retried.
    pub fn or_else(self, f: impl FnOnce() -> Lookup<T>) -> Lookup<T> {
        match self {
            Lookup::Missing => f(),
            other => other,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Collapse to an option, logging invalid input under `context`.
    pub fn found(self, context: &str) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::Missing => None,
            Lookup::Invalid(reason) => {
                log::warn!("{context}: ignoring invalid request input: {reason}");
                None
            }
        }
    }
}

/// The authenticated principal, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Everything the context helpers may read about the current request.
#[derive(Debug, Clone, Default)]
pub struct RenderInputs {
    args: BTreeMap<String, String>,
    form_data: Lookup<FormData>,
    user: Option<UserIdentity>,
    session_locale: Option<String>,
    accept_language: Option<String>,
    rls_rules: Vec<String>,
}

impl RenderInputs {
    /// Inputs for a render with no request at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a request's parts.
    ///
    /// `form_data` is read from the JSON body, the form body and the query
    /// string in that order, later payloads overriding earlier ones. A
    /// payload that fails to parse makes the whole form data invalid.
    pub fn from_request(
        args: BTreeMap<String, String>,
        form: Option<&BTreeMap<String, String>>,
        json_body: Option<&serde_json::Value>,
    ) -> Self {
        let mut payloads: Vec<CoreResult<FormData>> = Vec::new();
        if let Some(raw) = json_body.and_then(|body| body.get("form_data")) {
            payloads.push(FormData::from_value(raw));
        }
        if let Some(raw) = form.and_then(|f| f.get("form_data")) {
            payloads.push(FormData::from_json(raw));
        }
        if let Some(raw) = args.get("form_data") {
            payloads.push(FormData::from_json(raw));
        }

        let mut form_data: Lookup<FormData> = Lookup::Missing;
        for payload in payloads {
            form_data = match (form_data, payload) {
                (Lookup::Invalid(reason), _) => Lookup::Invalid(reason),
                (_, Err(e)) => Lookup::Invalid(e.to_string()),
                (Lookup::Found(current), Ok(next)) => Lookup::Found(current.merge(next)),
                (Lookup::Missing, Ok(next)) => Lookup::Found(next),
            };
        }

        Self {
            args,
            form_data,
            ..Self::default()
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_form_data(mut self, form_data: FormData) -> Self {
        self.form_data = Lookup::Found(form_data);
        self
    }

    /// Attach a raw `form_data` JSON payload, recording parse failures.
    pub fn with_form_data_json(mut self, raw: &str) -> Self {
        self.form_data = match FormData::from_json(raw) {
            Ok(fd) => Lookup::Found(fd),
            Err(e) => Lookup::Invalid(e.to_string()),
        };
        self
    }

    pub fn with_user(mut self, user: UserIdentity) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_session_locale(mut self, locale: impl Into<String>) -> Self {
        self.session_locale = Some(locale.into());
        self
    }

    pub fn with_accept_language(mut self, header: impl Into<String>) -> Self {
        self.accept_language = Some(header.into());
        self
    }

    pub fn with_rls_rules(mut self, rules: impl IntoIterator<Item = String>) -> Self {
        self.rls_rules = rules.into_iter().collect();
        self
    }

    pub fn args(&self) -> &BTreeMap<String, String> {
        &self.args
    }

    pub fn form_data(&self) -> Lookup<&FormData> {
        self.form_data.as_ref()
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    pub fn rls_rules(&self) -> &[String] {
        &self.rls_rules
    }

    /// Look up a URL parameter: query string first, then `form_data.url_params`.
    pub fn url_param(&self, name: &str) -> Lookup<serde_json::Value> {
        match self.args.get(name) {
            Some(value) if !value.is_empty() => {
                Lookup::Found(serde_json::Value::String(value.clone()))
            }
            _ => self
                .form_data()
                .and_then(|fd| Lookup::from_option(fd.url_params.get(name).cloned()))
                .and_then(|value| match value {
                    serde_json::Value::Null => Lookup::Missing,
                    other => Lookup::Found(other),
                }),
        }
    }

    /// Resolve the user's locale.
    ///
    /// Priority: session override, then the best Accept-Language match
    /// (restricted to `supported` when it is non-empty), then `default`.
    pub fn resolve_locale(&self, supported: &[String], default: &str) -> String {
        if let Some(locale) = self.session_locale.as_deref().filter(|l| !l.trim().is_empty()) {
            return locale.trim().to_string();
        }
        self.accept_language
            .as_deref()
            .and_then(|header| best_language_match(header, supported))
            .unwrap_or_else(|| default.to_string())
    }
}

/// Parse an Accept-Language header into tags ordered by quality.
///
/// Tags with `q=0` and the `*` wildcard are dropped; ties keep header order.
pub fn parse_accept_language(header: &str) -> Vec<(String, f32)> {
    let mut tags: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let quality = pieces
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (quality > 0.0).then(|| (tag.to_string(), quality))
        })
        .collect();
    tags.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    tags
}

fn normalize_tag(tag: &str) -> String {
    tag.replace('-', "_").to_ascii_lowercase()
}

fn primary_subtag(tag: &str) -> String {
    normalize_tag(tag)
        .split('_')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn best_language_match(header: &str, supported: &[String]) -> Option<String> {
    let tags = parse_accept_language(header);
    if supported.is_empty() {
        return tags.first().map(|(tag, _)| primary_subtag(tag));
    }
    tags.iter().find_map(|(tag, _)| {
        supported
            .iter()
            .find(|s| normalize_tag(s) == normalize_tag(tag))
            .or_else(|| supported.iter().find(|s| normalize_tag(s) == primary_subtag(tag)))
            .cloned()
    })
}

#[cfg(test)]
#[path = "request_test.rs"]
mod tests;
