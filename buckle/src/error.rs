//! Error types and HTTP response conversion.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Framework error type.
///
/// Configuration-shaped variants (`Template`, `I18n`, `Config`) are fatal
/// at application construction: a broken template tree or locale catalog
/// refuses to serve traffic rather than 500-ing on some routes later.
/// Variants surfaced from handlers convert into plain-text responses via
/// [`IntoResponse`].
#[derive(Debug, Error)]
pub enum Error {
    /// Template discovery, parsing, or rendering failed.
    #[error("template error: {0}")]
    Template(String),

    /// Session storage could not be read or written.
    #[error("session error: {0}")]
    Session(String),

    /// A locale catalog could not be loaded.
    #[error("i18n error: {0}")]
    I18n(String),

    /// Application configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem or network I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            self.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = Error::Template("no template named \"missing\"".to_string());
        assert!(err.to_string().contains("missing"));
        assert!(err.to_string().starts_with("template error"));
    }
}
