//! Per-request handler context.
//!
//! [`Context`] is an axum extractor bundling everything a
//! server-rendered handler usually needs: the renderer, the session and
//! flash handles, the request value bag, and translation. Handlers that
//! only need one piece (say, a [`Flash`](crate::session::Flash)) can
//! extract that piece directly instead.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn show(ctx: Context, Path(id): Path<u64>) -> Response {
//!     let post = load(id).await;
//!     ctx.render("posts/show", Some(HashMap::from([
//!         ("title".to_string(), json!(post.title)),
//!     ])))
//!     .await
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tower_sessions::Session;

use crate::app::Engine;
use crate::error::Error;
use crate::render::{Data, RenderOptions, RenderScope, Renderer};
use crate::session::{CsrfToken, Flash};
use crate::values::Values;

/// Request context handed to handlers.
pub struct Context {
    engine: Arc<Engine>,
    /// The request's session handle.
    pub session: Session,
    /// Flash message access for this session.
    pub flash: Flash,
    /// The request-scoped value bag.
    pub values: Values,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl Context {
    /// The request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Render an HTML template under the default layout.
    ///
    /// Request-scoped values are merged with `data`, with `data` taking
    /// precedence on key collisions. Never fails: rendering problems
    /// degrade to a plain-text 500 response.
    pub async fn render(&self, name: &str, data: Option<Data>) -> Response {
        self.render_with(name, data, RenderOptions::default()).await
    }

    /// Render an HTML template with explicit options (status code,
    /// layout selection).
    pub async fn render_with(&self, name: &str, data: Option<Data>, opts: RenderOptions) -> Response {
        let scope = self.scope().await;
        self.engine.renderer.html(Some(&scope), name, data, opts)
    }

    /// Translate a message for this request's locale, merging the value
    /// bag into `args` (explicit args win).
    #[must_use]
    pub fn translate(&self, id: &str, args: &HashMap<String, JsonValue>, count: Option<i64>) -> String {
        let locale = self.locale();
        let mut merged = self.values.list();
        for (key, value) in args {
            merged.insert(key.clone(), value.clone());
        }
        self.engine.translator.translate(&locale, id, &merged, count)
    }

    /// The locale negotiated for this request.
    #[must_use]
    pub fn locale(&self) -> String {
        let query_locale = self.uri.query().and_then(|query| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "locale")
                .map(|(_, value)| value.into_owned())
        });
        let accept = self
            .headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok());

        self.engine
            .translator
            .resolve_locale(query_locale.as_deref(), accept)
    }

    /// Redirect to `url`: 303 See Other for mutating methods, 302 Found
    /// otherwise, so form posts follow the post-redirect-get pattern.
    #[must_use]
    pub fn redirect(&self, url: &str) -> Response {
        let status = match self.method {
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE => StatusCode::SEE_OTHER,
            _ => StatusCode::FOUND,
        };
        (status, [(header::LOCATION, url.to_string())]).into_response()
    }

    /// Send a JSON response with the given status code.
    pub fn json<T: Serialize>(&self, status: StatusCode, value: &T) -> Response {
        (status, Json(serde_json::to_value(value).unwrap_or(JsonValue::Null))).into_response()
    }

    /// Send a plain-text response with the given status code.
    #[must_use]
    pub fn text(&self, status: StatusCode, body: impl Into<String>) -> Response {
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body.into(),
        )
            .into_response()
    }

    /// Send an empty 204 No Content response.
    #[must_use]
    pub fn no_content(&self) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }

    /// Convert a handler error into a response: a plain-text 500 for
    /// idempotent requests; for mutating requests the error is flashed
    /// under `"alert"` and the client is sent back to the referrer.
    pub async fn error(&self, err: Error) -> Response {
        tracing::error!(error = %err, path = %self.uri.path(), "handler error");

        match self.method {
            Method::GET | Method::HEAD | Method::OPTIONS => {
                Renderer::text_error(&err.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => {
                if let Err(flash_err) = self
                    .flash
                    .add("alert", JsonValue::String(err.to_string()))
                    .await
                {
                    tracing::warn!(error = %flash_err, "failed to flash handler error");
                }
                let back = self
                    .headers
                    .get(header::REFERER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("/");
                self.redirect(back)
            }
        }
    }

    /// Assemble the request-scoped data for one render. Flashes are
    /// taken here — when a render actually happens — so handlers that
    /// only redirect pass them through to the next page untouched.
    async fn scope(&self) -> RenderScope {
        let csrf_token = match CsrfToken::get_or_create(&self.session, self.engine.csrf.token_length)
            .await
        {
            Ok(token) => Some(token.token().to_string()),
            Err(err) => {
                tracing::warn!(error = %err, "could not resolve CSRF token for render");
                None
            }
        };

        let flashes = match self.flash.take().await {
            Ok(flashes) => flashes,
            Err(err) => {
                tracing::warn!(error = %err, "could not take flash messages for render");
                HashMap::new()
            }
        };

        RenderScope {
            method: self.method.clone(),
            path: self.uri.path().to_string(),
            locale: self.locale(),
            csrf_token,
            flashes,
            values: self.values.clone(),
        }
    }
}

impl<S> FromRequestParts<S> for Context
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let engine = parts
            .extensions
            .get::<Arc<Engine>>()
            .cloned()
            .ok_or_else(|| {
                Error::Config(
                    "application engine not found in request extensions; \
                     was the router built with App::into_router?"
                        .to_string(),
                )
            })?;

        let session = parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            Error::Session("session not found in request extensions".to_string())
        })?;

        let values = parts
            .extensions
            .get::<Values>()
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            engine,
            flash: Flash::new(session.clone()),
            session,
            values,
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        })
    }
}
