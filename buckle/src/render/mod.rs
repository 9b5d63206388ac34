//! HTML rendering with layouts.
//!
//! The renderer owns a cache of composed templates: every content file
//! under the template root is parsed into an independent clone of every
//! layout under `layouts/`, keyed by (layout, content). Handlers render
//! by content name; the layout wraps the content at its
//! `{% include "content" %}` extension point.
//!
//! Request-contextual template functions (CSRF fields, flash messages,
//! translations) resolve in two phases: no-op placeholders at parse
//! time, live per-request implementations at render time. See
//! [`TemplateFuncs`] for the contract.
//!
//! # Reload modes
//!
//! With `reload` off the cache is built once and read without locking.
//! With `reload` on, every render rebuilds the cache from disk under a
//! mutex held only for rebuild-and-lookup; template execution always
//! happens outside the lock, so concurrent renders are never
//! serialized.
//!
//! # Example
//!
//! ```rust,ignore
//! let renderer = Renderer::new(render::Options {
//!     dir: "templates".into(),
//!     ..Default::default()
//! })?;
//! let response = renderer.html(None, "index", None, RenderOptions::default());
//! ```

mod compose;
mod funcs;
mod store;

pub use funcs::{noop_func, FuncMap, RenderScope, TemplateFuncs};

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use minijinja::{Environment, Value};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

use compose::{LookupOutcome, RenderCache};
use funcs::live_table;

/// Handler-supplied render data: template variable name → value.
pub type Data = HashMap<String, JsonValue>;

/// Renderer construction options.
pub struct Options {
    /// Directory containing the template tree.
    pub dir: PathBuf,
    /// Layout used when [`RenderOptions::layout`] is [`Layout::Default`].
    pub default_layout: String,
    /// Rebuild the template cache from disk before every render.
    pub reload: bool,
    /// Request-contextual function providers, in registration order.
    pub funcs: Vec<Arc<dyn TemplateFuncs>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("templates"),
            default_layout: String::from("layout"),
            reload: false,
            funcs: Vec::new(),
        }
    }
}

/// Layout selection for a single render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Layout {
    /// The renderer's configured default layout.
    #[default]
    Default,
    /// A specific layout under `layouts/`.
    Named(String),
    /// No layout; the content template renders bare.
    None,
}

/// Per-render options.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Response status code. Defaults to 200.
    pub status_code: Option<StatusCode>,
    /// Layout selection. Defaults to the configured default layout.
    pub layout: Layout,
}

impl RenderOptions {
    /// Set the response status code.
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Render under the named layout.
    #[must_use]
    pub fn layout(mut self, name: impl Into<String>) -> Self {
        self.layout = Layout::Named(name.into());
        self
    }

    /// Render the content template without any layout.
    #[must_use]
    pub fn no_layout(mut self) -> Self {
        self.layout = Layout::None;
        self
    }
}

enum CacheState {
    /// Built once at startup; the read path takes no locks.
    Static(RenderCache),
    /// Rebuilt before every render, under the lock.
    Reloading(Mutex<RenderCache>),
}

/// The template rendering engine.
pub struct Renderer {
    dir: PathBuf,
    default_layout: String,
    providers: Vec<Arc<dyn TemplateFuncs>>,
    cache: CacheState,
}

impl Renderer {
    /// Build the template cache and return the renderer.
    ///
    /// # Errors
    ///
    /// Fails if the template root is missing, contains a file with a
    /// foreign extension, or any template fails to parse. A renderer is
    /// never constructed over a partial template set.
    pub fn new(options: Options) -> Result<Self> {
        let cache = RenderCache::build(&options.dir, &options.funcs)?;
        let cache = if options.reload {
            CacheState::Reloading(Mutex::new(cache))
        } else {
            CacheState::Static(cache)
        };

        Ok(Self {
            dir: options.dir,
            default_layout: options.default_layout,
            providers: options.funcs,
            cache,
        })
    }

    /// Render the named content template to a string.
    ///
    /// The render context is assembled from the request's value bag,
    /// then the handler `data` (which wins key collisions), then the
    /// live function table (whose names are reserved). With
    /// `scope: None` the template renders with placeholder functions
    /// only — useful for mail bodies and tests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] for unknown layout or content names
    /// (the message enumerates the known set) and for execution
    /// failures. All error paths are logged.
    pub fn render(
        &self,
        scope: Option<&RenderScope>,
        name: &str,
        data: Option<Data>,
        opts: &RenderOptions,
    ) -> Result<String> {
        let layout = match &opts.layout {
            Layout::Default => Some(self.default_layout.as_str()),
            Layout::Named(named) => Some(named.as_str()),
            Layout::None => None,
        };

        let (env, template) = match self.resolve(layout, name) {
            Ok(found) => found,
            Err(reason) => {
                tracing::error!(template = name, layout = ?layout, %reason, "template lookup failed");
                return Err(Error::Template(reason));
            }
        };

        let mut context: BTreeMap<String, Value> = BTreeMap::new();
        if let Some(scope) = scope {
            for (key, value) in scope.values.list() {
                context.insert(key, Value::from_serialize(&value));
            }
        }
        if let Some(data) = data {
            for (key, value) in data {
                context.insert(key, Value::from_serialize(&value));
            }
        }
        if let Some(scope) = scope {
            for (fn_name, value) in live_table(&self.providers, scope) {
                context.insert(fn_name, value);
            }
        }

        let tmpl = env
            .get_template(&template)
            .map_err(|err| Error::Template(err.to_string()))?;

        tmpl.render(Value::from_iter(context)).map_err(|err| {
            tracing::error!(
                template = name,
                layout = ?layout,
                error = %err,
                "template execution failed; defined templates are: {}",
                self.defined_templates(),
            );
            Error::Template(err.to_string())
        })
    }

    /// Render the named content template into an HTML response.
    ///
    /// Output is buffered before anything is written, so failures — an
    /// unknown name, an execution error mid-template — always degrade
    /// to a complete plain-text 500 response rather than a half-written
    /// page. This method never panics.
    pub fn html(
        &self,
        scope: Option<&RenderScope>,
        name: &str,
        data: Option<Data>,
        opts: RenderOptions,
    ) -> Response {
        let status = opts.status_code.unwrap_or(StatusCode::OK);

        match self.render(scope, name, data, &opts) {
            Ok(body) => {
                (status, [(header::CONTENT_TYPE, "text/html")], body).into_response()
            }
            Err(err) => {
                let message = match err {
                    Error::Template(message) => message,
                    other => other.to_string(),
                };
                Self::text_error(&message, StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Write a plain-text error response.
    #[must_use]
    pub fn text_error(message: &str, status: StatusCode) -> Response {
        (
            status,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            message.to_string(),
        )
            .into_response()
    }

    /// Enumerate the known layouts and content templates. Used in error
    /// bodies; also handy for debugging.
    pub fn defined_templates(&self) -> String {
        match &self.cache {
            CacheState::Static(cache) => cache.defined_templates(),
            CacheState::Reloading(lock) => lock_cache(lock).defined_templates(),
        }
    }

    /// Resolve (layout, content) to an executable environment. In
    /// reloading mode this rebuilds the cache first; the lock is
    /// dropped before the returned environment is executed.
    fn resolve(
        &self,
        layout: Option<&str>,
        name: &str,
    ) -> std::result::Result<(Environment<'static>, String), String> {
        match &self.cache {
            CacheState::Static(cache) => select(cache, layout, name),
            CacheState::Reloading(lock) => {
                let mut guard = lock_cache(lock);
                match RenderCache::build(&self.dir, &self.providers) {
                    Ok(fresh) => {
                        *guard = fresh;
                        tracing::debug!(dir = %self.dir.display(), "template cache rebuilt");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "template rebuild failed; keeping previous cache");
                        return Err(err.to_string());
                    }
                }
                select(&guard, layout, name)
            }
        }
    }
}

fn lock_cache(lock: &Mutex<RenderCache>) -> std::sync::MutexGuard<'_, RenderCache> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn select(
    cache: &RenderCache,
    layout: Option<&str>,
    name: &str,
) -> std::result::Result<(Environment<'static>, String), String> {
    match cache.lookup(layout, name) {
        LookupOutcome::Found { env, template } => Ok((env, template)),
        LookupOutcome::UnknownLayout => Err(format!(
            "no layout named {:?}, defined templates are: {}",
            layout.unwrap_or_default(),
            cache.defined_templates()
        )),
        LookupOutcome::UnknownContent => Err(format!(
            "no template named {name:?}, defined templates are: {}",
            cache.defined_templates()
        )),
    }
}
