//! Request-scoped values.
//!
//! A [`Values`] bag is installed into every request's extensions by the
//! application's middleware stack. Anything placed in it — typically by
//! middleware, e.g. the display name of the signed-in user — is merged
//! into the data of every subsequent render on that request, so ambient
//! defaults don't have to be threaded through each handler by hand.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn require_user(ctx: Context, req: Request, next: Next) -> Response {
//!     ctx.values.insert("current_user", json!("ada"));
//!     next.run(req).await
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;

/// A cheaply clonable, request-scoped key/value bag.
///
/// Clones share the same underlying storage; the bag lives exactly as
/// long as the request whose extensions hold it.
#[derive(Debug, Clone, Default)]
pub struct Values {
    inner: Arc<Mutex<HashMap<String, JsonValue>>>,
}

impl Values {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the given key/value pair on the request.
    pub fn insert(&self, key: impl Into<String>, value: JsonValue) {
        self.lock().insert(key.into(), value);
    }

    /// Return the value with the given key, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        self.lock().get(key).cloned()
    }

    /// Remove and return the value with the given key.
    pub fn remove(&self, key: &str) -> Option<JsonValue> {
        self.lock().remove(key)
    }

    /// Return a snapshot of all values.
    #[must_use]
    pub fn list(&self) -> HashMap<String, JsonValue> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JsonValue>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
