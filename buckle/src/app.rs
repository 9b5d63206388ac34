//! Application construction and wiring.
//!
//! An [`App`] owns one renderer, one translator, and the middleware
//! stack (sessions, CSRF, request values, tracing, static files). There
//! is no process-wide default instance: construct an `App` from
//! [`Options`] and hand its router to a server.
//!
//! # Example
//!
//! ```rust,no_run
//! use buckle::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> buckle::Result<()> {
//!     let options = Options::load()?;
//!     buckle::init_tracing(&options);
//!
//!     let app = App::new(options)?
//!         .route("/", get(home));
//!
//!     app.listen("0.0.0.0:3000").await
//! }
//!
//! async fn home(ctx: Context) -> Response {
//!     ctx.render("index", None).await
//! }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::Request, routing::MethodRouter, Extension, Router};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use minijinja::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};
use crate::i18n::Translator;
use crate::render::{self, noop_func, FuncMap, RenderScope, Renderer, TemplateFuncs};
use crate::session::{session_layer, CsrfConfig, CsrfLayer, CsrfToken, SessionConfig};
use crate::values::Values;

/// Application configuration.
///
/// Loaded from `buckle.toml` and `BUCKLE_`-prefixed environment
/// variables by [`Options::load`], or built in code with struct update
/// syntax over [`Options::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Directory containing HTML templates.
    ///
    /// Default: `"templates"`
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    /// Directory containing `<locale>.json` message catalogs.
    #[serde(default)]
    pub locale_dir: Option<PathBuf>,

    /// Fallback locale.
    ///
    /// Default: `"en"`
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Layout used when a render doesn't pick one.
    ///
    /// Default: `"layout"`
    #[serde(default = "default_layout")]
    pub default_layout: String,

    /// Rebuild templates and locale catalogs on every request.
    /// Development only.
    ///
    /// Default: `false`
    #[serde(default)]
    pub reload: bool,

    /// Serve static files from [`Options::public_dir`] at `/public`.
    ///
    /// Default: `true`
    #[serde(default = "default_serve_public")]
    pub serve_public: bool,

    /// Static file directory.
    ///
    /// Default: `"public"`
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,

    /// Log filter directive for [`init_tracing`].
    ///
    /// Default: `"info"`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Session cookie configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// CSRF protection configuration.
    #[serde(default)]
    pub csrf: CsrfConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            template_dir: default_template_dir(),
            locale_dir: None,
            default_locale: default_locale(),
            default_layout: default_layout(),
            reload: false,
            serve_public: default_serve_public(),
            public_dir: default_public_dir(),
            log_level: default_log_level(),
            session: SessionConfig::default(),
            csrf: CsrfConfig::default(),
        }
    }
}

impl Options {
    /// Load configuration: defaults, then `./buckle.toml`, then
    /// `BUCKLE_`-prefixed environment variables (highest precedence,
    /// `__` for nesting).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a source fails to parse.
    pub fn load() -> Result<Self> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("buckle.toml"))
            .merge(Env::prefixed("BUCKLE_").split("__"))
            .extract()
            .map_err(|err| Error::Config(err.to_string()))
    }
}

/// Initialize JSON-formatted tracing with the configured log filter.
pub fn init_tracing(options: &Options) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_new(&options.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Shared per-application internals, installed into request extensions
/// so extractors can reach them.
pub(crate) struct Engine {
    pub(crate) renderer: Renderer,
    pub(crate) translator: Arc<Translator>,
    pub(crate) csrf: CsrfConfig,
}

/// A configured application: renderer, translator, middleware stack,
/// and routes.
pub struct App {
    engine: Arc<Engine>,
    router: Router,
    options: Options,
}

impl App {
    /// Build an application from options.
    ///
    /// # Errors
    ///
    /// Fails if the template tree or locale catalogs are broken; a
    /// misconfigured application refuses to start rather than serving
    /// some routes and 500-ing others.
    pub fn new(options: Options) -> Result<Self> {
        Self::with_funcs(options, Vec::new())
    }

    /// Build an application with additional template function
    /// providers. Providers are consulted in registration order, after
    /// the built-in defaults; the first provider to declare a name
    /// wins.
    pub fn with_funcs(options: Options, funcs: Vec<Arc<dyn TemplateFuncs>>) -> Result<Self> {
        let translator = Arc::new(Translator::new(
            options.locale_dir.clone(),
            options.default_locale.clone(),
            options.reload,
        )?);

        let mut providers: Vec<Arc<dyn TemplateFuncs>> = vec![Arc::new(DefaultFuncs {
            translator: translator.clone(),
        })];
        providers.extend(funcs);

        let renderer = Renderer::new(render::Options {
            dir: options.template_dir.clone(),
            default_layout: options.default_layout.clone(),
            reload: options.reload,
            funcs: providers,
        })?;

        let engine = Arc::new(Engine {
            renderer,
            translator,
            csrf: options.csrf.clone(),
        });

        Ok(Self {
            engine,
            router: Router::new(),
            options,
        })
    }

    /// Register a route.
    #[must_use]
    pub fn route(mut self, path: &str, method_router: MethodRouter) -> Self {
        self.router = self.router.route(path, method_router);
        self
    }

    /// Merge an externally built router.
    #[must_use]
    pub fn merge(mut self, other: Router) -> Self {
        self.router = self.router.merge(other);
        self
    }

    /// Nest a router under a path prefix.
    #[must_use]
    pub fn nest(mut self, path: &str, other: Router) -> Self {
        self.router = self.router.nest(path, other);
        self
    }

    /// Register a fallback handler for requests no route matches.
    #[must_use]
    pub fn fallback<H, T>(mut self, handler: H) -> Self
    where
        H: axum::handler::Handler<T, ()>,
        T: 'static,
    {
        self.router = self.router.fallback(handler);
        self
    }

    /// The renderer's diagnostic template enumeration.
    #[must_use]
    pub fn defined_templates(&self) -> String {
        self.engine.renderer.defined_templates()
    }

    /// Finalize the middleware stack and return the axum router.
    #[must_use]
    pub fn into_router(self) -> Router {
        let mut router = self.router;

        if self.options.serve_public {
            router = router.nest_service("/public", ServeDir::new(&self.options.public_dir));
        }

        // Layer order is inside-out: the session layer must wrap both
        // the CSRF check and anything that touches the session.
        router
            .layer(CsrfLayer::new(self.options.csrf.clone()))
            .layer(Extension(self.engine))
            .layer(axum::middleware::map_request(install_values))
            .layer(session_layer(&self.options.session))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind `addr` and serve the application.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server
    /// fails.
    pub async fn listen(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "listening");
        axum::serve(listener, self.into_router()).await?;
        Ok(())
    }
}

/// Give every request its own value bag.
async fn install_values(mut request: Request) -> Request {
    request.extensions_mut().insert(Values::new());
    request
}

const DEFAULT_FUNC_NAMES: &[&str] = &[
    "t",
    "csrf_token",
    "csrf_field",
    "csrf_meta",
    "flashes",
    "current_path",
    "asset_path",
];

/// The built-in template function set, registered ahead of any
/// user-supplied providers.
struct DefaultFuncs {
    translator: Arc<Translator>,
}

impl TemplateFuncs for DefaultFuncs {
    fn funcs(&self, scope: Option<&RenderScope>) -> FuncMap {
        let Some(scope) = scope else {
            return DEFAULT_FUNC_NAMES
                .iter()
                .map(|name| ((*name).to_string(), noop_func()))
                .collect();
        };

        let mut table = FuncMap::new();

        let translator = self.translator.clone();
        let locale = scope.locale.clone();
        let values = scope.values.clone();
        table.push((
            "t".to_string(),
            Value::from_function(
                move |id: String, args: Option<Value>, count: Option<i64>| -> String {
                    let mut merged: HashMap<String, JsonValue> = values.list();
                    if let Some(args) = args {
                        if let Ok(JsonValue::Object(map)) = serde_json::to_value(&args) {
                            for (key, value) in map {
                                merged.insert(key, value);
                            }
                        }
                    }
                    translator.translate(&locale, &id, &merged, count)
                },
            ),
        ));

        let token = scope.csrf_token.clone().unwrap_or_default();
        let raw = token.clone();
        table.push((
            "csrf_token".to_string(),
            Value::from_function(move || raw.clone()),
        ));

        let field = CsrfToken::new(token.clone());
        table.push((
            "csrf_field".to_string(),
            Value::from_function(move || Value::from_safe_string(field.as_hidden_field())),
        ));

        let meta = CsrfToken::new(token);
        table.push((
            "csrf_meta".to_string(),
            Value::from_function(move || Value::from_safe_string(meta.as_meta_tag())),
        ));

        let flashes = scope.flashes.clone();
        table.push((
            "flashes".to_string(),
            Value::from_function(move || Value::from_serialize(&flashes)),
        ));

        let path = scope.path.clone();
        table.push((
            "current_path".to_string(),
            Value::from_function(move || path.clone()),
        ));

        table.push(("asset_path".to_string(), Value::from_function(asset_path)));

        table
    }
}

/// Append a cache-busting query parameter holding the file's mtime.
/// Used for stylesheets and scripts that change between deploys.
fn asset_path(path: String) -> String {
    let local = path.trim_start_matches('/');
    match std::fs::metadata(local).and_then(|meta| meta.modified()) {
        Ok(mtime) => match mtime.duration_since(std::time::UNIX_EPOCH) {
            Ok(elapsed) => format!("{path}?{}", elapsed.as_secs()),
            Err(_) => path,
        },
        Err(err) => {
            tracing::debug!(%path, error = %err, "could not stat asset for versioning");
            path
        }
    }
}

// Default value functions
fn default_template_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_layout() -> String {
    "layout".to_string()
}

fn default_serve_public() -> bool {
    true
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults_are_conventional() {
        let options = Options::default();
        assert_eq!(options.template_dir, PathBuf::from("templates"));
        assert_eq!(options.default_layout, "layout");
        assert!(!options.reload);
        assert!(options.csrf.enabled);
    }

    #[test]
    fn default_funcs_declare_the_same_names_in_both_phases() {
        let provider = DefaultFuncs {
            translator: Arc::new(Translator::new(None, "en", false).unwrap()),
        };

        let placeholder_names: Vec<String> = provider
            .funcs(None)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        let live_names: Vec<String> = provider
            .funcs(Some(&RenderScope::default()))
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        assert_eq!(placeholder_names, live_names);
    }

    #[test]
    fn asset_path_leaves_missing_files_untouched() {
        assert_eq!(asset_path("/js/nope.js".to_string()), "/js/nope.js");
    }
}
