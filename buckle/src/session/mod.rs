//! Cookie-based sessions, flash messages, and CSRF protection.
//!
//! Session storage is delegated to `tower-sessions` with an in-memory
//! store; this module builds the session layer from [`SessionConfig`]
//! and layers the framework's flash-message and CSRF semantics on top.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn login(ctx: Context, Form(creds): Form<Login>) -> Response {
//!     // ... verify ...
//!     ctx.session.insert("user_id", &user.id).await?;
//!     ctx.flash.add("notice", json!("Welcome back!")).await?;
//!     ctx.redirect("/")
//! }
//! ```

mod config;
mod csrf;
mod flash;

pub use config::{CsrfConfig, SessionConfig};
pub use csrf::{CsrfLayer, CsrfMiddleware, CsrfToken};
pub use flash::Flash;

// Re-export tower-sessions types for convenience.
pub use tower_sessions::{Expiry, Session, SessionManagerLayer};
pub use tower_sessions_memory_store::MemoryStore;

use time::Duration;

/// Create a `SessionManagerLayer` backed by the in-memory store from
/// configuration. The layer must wrap the CSRF layer and any handler
/// that touches the session.
#[must_use]
pub fn session_layer(config: &SessionConfig) -> SessionManagerLayer<MemoryStore> {
    use tower_sessions::cookie::SameSite;

    let store = MemoryStore::default();

    let expiry = if config.expiry_secs == 0 {
        Expiry::OnSessionEnd
    } else {
        Expiry::OnInactivity(Duration::seconds(config.expiry_secs as i64))
    };

    let same_site = match config.same_site.to_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    };

    let mut layer = SessionManagerLayer::new(store)
        .with_name(config.cookie_name.clone())
        .with_expiry(expiry)
        .with_secure(config.secure)
        .with_http_only(config.http_only)
        .with_same_site(same_site)
        .with_path(config.cookie_path.clone());

    if let Some(domain) = config.cookie_domain.clone() {
        layer = layer.with_domain(domain);
    }

    layer
}
