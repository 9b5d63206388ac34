//! CSRF (Cross-Site Request Forgery) protection.
//!
//! A random token is stored in the session and made available to
//! templates through the default `csrf_field()` / `csrf_meta()` /
//! `csrf_token()` functions. The [`CsrfLayer`] middleware validates the
//! token on non-safe methods, accepting it from the `X-CSRF-Token`
//! header or the `_csrf` form field.
//!
//! # Example
//!
//! ```html
//! <form method="post" action="/posts">
//!     {{ csrf_field() }}
//!     <input type="text" name="title">
//!     <button type="submit">Save</button>
//! </form>
//! ```

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{header, request::Parts, Request, StatusCode},
    response::{IntoResponse, Response},
};
use rand::Rng;
use tower_sessions::Session;

use super::config::CsrfConfig;
use crate::error::Error;

const CSRF_SESSION_KEY: &str = "_csrf_token";

/// CSRF token extractor and markup helper.
///
/// Extracting a `CsrfToken` generates and stores a token in the session
/// if one isn't already present.
#[derive(Debug, Clone)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Wrap an existing token value.
    #[must_use]
    pub fn new(token: String) -> Self {
        Self(token)
    }

    /// The raw token string.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }

    /// A hidden `<input>` carrying the token, for inclusion in forms.
    #[must_use]
    pub fn as_hidden_field(&self) -> String {
        format!(
            r#"<input type="hidden" name="_csrf" value="{}">"#,
            html_escape(&self.0)
        )
    }

    /// A `<meta>` tag carrying the token, for the document head.
    #[must_use]
    pub fn as_meta_tag(&self) -> String {
        format!(
            r#"<meta name="csrf-token" content="{}">"#,
            html_escape(&self.0)
        )
    }

    /// Generate a new random token.
    #[must_use]
    pub fn generate(length: usize) -> Self {
        let token: String = rand::rng()
            .sample_iter(&rand::distr::Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Return the session's token, generating and storing one if the
    /// session doesn't have one yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or written.
    pub async fn get_or_create(session: &Session, length: usize) -> Result<Self, Error> {
        if let Some(token) = session
            .get::<String>(CSRF_SESSION_KEY)
            .await
            .map_err(|err| Error::Session(format!("failed to read CSRF token: {err}")))?
        {
            return Ok(Self(token));
        }

        let token = Self::generate(length);
        session
            .insert(CSRF_SESSION_KEY, &token.0)
            .await
            .map_err(|err| Error::Session(format!("failed to store CSRF token: {err}")))?;

        Ok(token)
    }

    /// Replace the session's token. Call after login to prevent token
    /// fixation.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be written.
    pub async fn regenerate(session: &Session, length: usize) -> Result<Self, Error> {
        let token = Self::generate(length);
        session
            .insert(CSRF_SESSION_KEY, &token.0)
            .await
            .map_err(|err| Error::Session(format!("failed to store CSRF token: {err}")))?;
        Ok(token)
    }
}

impl std::fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            Error::Session("session not found in request extensions for CSRF".to_string())
        })?;

        const DEFAULT_TOKEN_LENGTH: usize = 32;
        Self::get_or_create(&session, DEFAULT_TOKEN_LENGTH).await
    }
}

/// CSRF validation middleware layer.
///
/// Must be applied inside the session layer, since the expected token
/// lives in the session.
#[derive(Debug, Clone)]
pub struct CsrfLayer {
    config: CsrfConfig,
}

impl CsrfLayer {
    /// Create a layer with the given configuration.
    #[must_use]
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }
}

impl<S> tower::Layer<S> for CsrfLayer {
    type Service = CsrfMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfMiddleware {
            inner,
            config: self.config.clone(),
        }
    }
}

/// CSRF middleware service.
#[derive(Debug, Clone)]
pub struct CsrfMiddleware<S> {
    inner: S,
    config: CsrfConfig,
}

impl<S> tower::Service<Request<Body>> for CsrfMiddleware<S>
where
    S: tower::Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let config = self.config.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !config.enabled {
                return inner.call(request).await;
            }

            let is_safe = config
                .safe_methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(request.method().as_str()));

            if is_safe {
                return inner.call(request).await;
            }

            let Some(session) = request.extensions().get::<Session>().cloned() else {
                tracing::warn!("CSRF validation failed: no session found");
                return Ok(reject("no session"));
            };

            let expected: Option<String> = session.get(CSRF_SESSION_KEY).await.ok().flatten();
            let Some(expected) = expected else {
                tracing::warn!("CSRF validation failed: no token in session");
                return Ok(reject("no token in session"));
            };

            let mut provided = request
                .headers()
                .get(&config.header_name)
                .and_then(|value| value.to_str().ok())
                .map(String::from);

            // Fall back to the form field for plain HTML form posts. The
            // body is buffered, scanned, and restored for the handler.
            let mut request = request;
            if provided.is_none() && is_form(&request) {
                let (parts, body) = request.into_parts();
                let bytes = match axum::body::to_bytes(body, config.max_form_bytes).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!(error = %err, "CSRF validation failed: unreadable form body");
                        return Ok(reject("unreadable form body"));
                    }
                };

                provided = form_urlencoded::parse(&bytes)
                    .find(|(key, _)| key == config.form_field_name.as_str())
                    .map(|(_, value)| value.into_owned());

                request = Request::from_parts(parts, Body::from(bytes));
            }

            let Some(provided) = provided else {
                tracing::warn!("CSRF validation failed: no token provided");
                return Ok(reject("no token provided"));
            };

            if !constant_time_compare(&expected, &provided) {
                tracing::warn!("CSRF validation failed: token mismatch");
                return Ok(reject("invalid token"));
            }

            inner.call(request).await
        })
    }
}

fn is_form(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn reject(reason: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("Forbidden - CSRF validation failed: {reason}"),
    )
        .into_response()
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Basic HTML escaping for attribute values.
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
