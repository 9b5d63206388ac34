//! Two-phase template function resolution.
//!
//! Templates reference functions by name, and those references must
//! resolve when the template tree is built — long before any request
//! exists. The real implementations, on the other hand, are only useful
//! with a live request (a CSRF token, the session's flash messages, the
//! negotiated locale). The two generations:
//!
//! 1. **Placeholder table** — built once before parsing. Every provider
//!    is asked for its function names with no request scope, and each
//!    name is installed as a harmless no-op global on the base
//!    environment. Rendering a template without a request produces empty
//!    strings where contextual functions appear, never an error.
//! 2. **Live table** — rebuilt per render. Providers are invoked with
//!    the current [`RenderScope`] and the resulting values are merged
//!    into the render *context*, which shadows the placeholder globals
//!    for that single execution. The shared parsed template is never
//!    mutated, so concurrent renders of the same template cannot observe
//!    each other's functions.
//!
//! Duplicate names across providers are resolved deterministically: the
//! first-registered provider wins and a warning is logged.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use http::Method;
use minijinja::value::Rest;
use minijinja::Value;
use serde_json::Value as JsonValue;

use crate::values::Values;

/// A named template function table, in registration order.
pub type FuncMap = Vec<(String, Value)>;

/// Pre-resolved, request-scoped data handed to [`TemplateFuncs`]
/// providers when a live table is built.
///
/// Everything here is owned so that provider closures can capture what
/// they need and satisfy minijinja's `'static` function bound.
#[derive(Debug, Clone)]
pub struct RenderScope {
    /// Request method, used for redirect status selection.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Locale negotiated for this request.
    pub locale: String,
    /// CSRF token bound to this request's session, if any.
    pub csrf_token: Option<String>,
    /// Flash messages taken (destructively) for this render.
    pub flashes: HashMap<String, JsonValue>,
    /// The request's value bag.
    pub values: Values,
}

impl Default for RenderScope {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: String::from("/"),
            locale: String::from("en"),
            csrf_token: None,
            flashes: HashMap::new(),
            values: Values::new(),
        }
    }
}

/// A provider of request-contextual template functions.
///
/// When invoked with `None` the provider is being asked only for its
/// function *names*; the returned values are discarded and replaced with
/// no-ops before parsing. When invoked with `Some(scope)` the returned
/// values are used as-is for a single render.
pub trait TemplateFuncs: Send + Sync {
    /// Return the function table for the given scope.
    fn funcs(&self, scope: Option<&RenderScope>) -> FuncMap;
}

impl<F> TemplateFuncs for F
where
    F: Fn(Option<&RenderScope>) -> FuncMap + Send + Sync,
{
    fn funcs(&self, scope: Option<&RenderScope>) -> FuncMap {
        self(scope)
    }
}

/// A function value that accepts any arguments and renders as an empty
/// string. Stands in for every declared function during parsing.
#[must_use]
pub fn noop_func() -> Value {
    Value::from_function(|_args: Rest<Value>| Value::from(""))
}

/// Build the placeholder table: every name any provider declares, each
/// mapped to a no-op.
pub(crate) fn placeholder_table(providers: &[Arc<dyn TemplateFuncs>]) -> FuncMap {
    collapse(providers, None)
        .into_iter()
        .map(|(name, _)| (name, noop_func()))
        .collect()
}

/// Build the live table for one render.
pub(crate) fn live_table(providers: &[Arc<dyn TemplateFuncs>], scope: &RenderScope) -> FuncMap {
    collapse(providers, Some(scope))
}

/// Flatten provider tables in registration order, dropping duplicate
/// names. First registration wins.
fn collapse(providers: &[Arc<dyn TemplateFuncs>], scope: Option<&RenderScope>) -> FuncMap {
    let mut seen = HashSet::new();
    let mut table = Vec::new();

    for provider in providers {
        for (name, value) in provider.funcs(scope) {
            if !seen.insert(name.clone()) {
                tracing::warn!(function = %name, "duplicate template function; first registration wins");
                continue;
            }
            table.push((name, value));
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(entries: &'static [(&'static str, &'static str)]) -> Arc<dyn TemplateFuncs> {
        Arc::new(move |_scope: Option<&RenderScope>| {
            entries
                .iter()
                .map(|(name, out)| {
                    let out = *out;
                    (
                        (*name).to_string(),
                        Value::from_function(move || Value::from(out)),
                    )
                })
                .collect::<FuncMap>()
        })
    }

    #[test]
    fn first_registration_wins() {
        let providers = vec![
            provider(&[("greet", "first")]),
            provider(&[("greet", "second"), ("other", "ok")]),
        ];

        let table = live_table(&providers, &RenderScope::default());
        let names: Vec<_> = table.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["greet", "other"]);
    }

    #[test]
    fn placeholder_table_covers_all_declared_names() {
        let providers = vec![provider(&[("a", "1"), ("b", "2")]), provider(&[("c", "3")])];
        let table = placeholder_table(&providers);
        let names: Vec<_> = table.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn noop_accepts_any_arity() {
        let mut env = minijinja::Environment::new();
        env.add_global("t", noop_func());
        env.add_template("probe", "[{{ t('greeting', 1, 2) }}]").unwrap();
        let out = env.get_template("probe").unwrap().render(()).unwrap();
        assert_eq!(out, "[]");
    }
}
