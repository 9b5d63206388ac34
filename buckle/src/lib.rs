//! # buckle
//!
//! Rails-flavored convenience layer over axum for server-rendered web
//! applications: HTML templates with layouts, cookie sessions with
//! flash messages, CSRF protection, and i18n.
//!
//! ## Features
//!
//! - **Layouts**: templates under `templates/` render inside layouts
//!   from `templates/layouts/`, cached per (layout, content) pair
//! - **Hot reload**: `reload = true` rebuilds templates and locale
//!   catalogs on every request during development
//! - **Request-contextual template functions**: `csrf_field()`,
//!   `flashes()`, `t()` and friends resolve against the live request
//! - **Sessions & flash**: cookie sessions via `tower-sessions`, with
//!   consume-on-read flash messages
//! - **CSRF**: per-session tokens validated on mutating requests
//!
//! ## Example
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
//!         .route("/", get(home))
//!         .route("/hello", post(hello));
//!
//!     app.listen("0.0.0.0:3000").await
//! }
//!
//! async fn home(ctx: Context) -> Response {
//!     ctx.render("index", None).await
//! }
//!
//! async fn hello(ctx: Context) -> Response {
//!     if let Err(err) = ctx.flash.add("notice", json!("hi!")).await {
//!         return ctx.error(err).await;
//!     }
//!     ctx.redirect("/")
//! }
//! ```
//!
//! With `templates/layouts/layout.html`:
//!
//! ```html
//! <html><body>{% include "content" %}</body></html>
//! ```
//!
//! and `templates/index.html`:
//!
//! ```html
//! <p>Hello, world!</p>
//! ```

pub mod app;
pub mod context;
pub mod error;
pub mod i18n;
pub mod render;
pub mod session;
pub mod values;

pub use app::{init_tracing, App, Options};
pub use context::Context;
pub use error::{Error, Result};

// Custom [`render::TemplateFuncs`] providers build `minijinja::Value`
// function entries; re-export the engine so applications don't have to
// track its version themselves.
pub use minijinja;

pub mod prelude {
    //! One-stop imports for application code.

    pub use crate::app::{App, Options};
    pub use crate::context::Context;
    pub use crate::error::{Error, Result};
    pub use crate::i18n::Translator;
    pub use crate::render::{Data, Layout, RenderOptions, RenderScope, TemplateFuncs};
    pub use crate::session::{CsrfToken, Flash, Session};
    pub use crate::values::Values;

    pub use axum::extract::{Form, Path, Query};
    pub use axum::http::StatusCode;
    pub use axum::response::{IntoResponse, Response};
    pub use axum::routing::{delete, get, patch, post, put};
    pub use axum::Router;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::json;
}
