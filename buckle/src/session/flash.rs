//! Flash messages.
//!
//! Flash messages are one-time values stored in the session and
//! consumed when read — the post-redirect-get pattern's "saved!" banner.
//! They're kept as a keyed map (`"notice"`, `"alert"`, ...) so a page
//! can style each kind differently.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn create(ctx: Context, Form(form): Form<NewPost>) -> Response {
//!     // ... save ...
//!     ctx.flash.add("notice", json!("Post created")).await;
//!     ctx.redirect("/posts")
//! }
//! ```
//!
//! The default `flashes()` template function exposes the taken map to
//! every rendered page.

use std::collections::HashMap;

use axum::{extract::FromRequestParts, http::request::Parts};
use serde_json::Value as JsonValue;
use tower_sessions::Session;

use crate::error::Error;

const FLASH_SESSION_KEY: &str = "_flash";

/// Keyed flash message access for one request's session.
#[derive(Debug, Clone)]
pub struct Flash {
    session: Session,
}

impl Flash {
    /// Wrap a session handle.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Add a flash message under the given key, overwriting any
    /// previous message with the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or written.
    pub async fn add(&self, key: impl Into<String>, value: JsonValue) -> Result<(), Error> {
        let mut flashes: HashMap<String, JsonValue> = self
            .session
            .get(FLASH_SESSION_KEY)
            .await
            .map_err(|err| Error::Session(format!("failed to read flash messages: {err}")))?
            .unwrap_or_default();

        flashes.insert(key.into(), value);

        self.session
            .insert(FLASH_SESSION_KEY, &flashes)
            .await
            .map_err(|err| Error::Session(format!("failed to write flash messages: {err}")))
    }

    /// Take all flash messages, clearing them from the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or written.
    pub async fn take(&self) -> Result<HashMap<String, JsonValue>, Error> {
        let flashes: Option<HashMap<String, JsonValue>> = self
            .session
            .remove(FLASH_SESSION_KEY)
            .await
            .map_err(|err| Error::Session(format!("failed to take flash messages: {err}")))?;

        Ok(flashes.unwrap_or_default())
    }

    /// Read all flash messages without consuming them.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read.
    pub async fn peek(&self) -> Result<HashMap<String, JsonValue>, Error> {
        let flashes: Option<HashMap<String, JsonValue>> = self
            .session
            .get(FLASH_SESSION_KEY)
            .await
            .map_err(|err| Error::Session(format!("failed to read flash messages: {err}")))?;

        Ok(flashes.unwrap_or_default())
    }
}

impl<S> FromRequestParts<S> for Flash
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // The session layer inserts the handle into request extensions.
        let session = parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            Error::Session("session not found in request extensions for flash messages".to_string())
        })?;

        Ok(Self::new(session))
    }
}
