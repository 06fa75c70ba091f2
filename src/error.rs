//! Unified error type.
//!
//! Handlers signal client-visible failures with [`Error::Http`], which
//! carries the status code to answer with. Everything else is an
//! infrastructure or programming failure; unless an error-handling
//! middleware translates it, the adapter answers with a generic `500`.

use crate::validate::Issue;

/// Boxed cause carried by [`Error::Http`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by lumora's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A structured HTTP error. `code` is sent verbatim and `message`
    /// becomes the `{"error": …}` body.
    #[error("{message}")]
    Http {
        code: u16,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// No service with this name in the scoped or the app-level registry.
    #[error("service '{0}' not found")]
    ServiceNotFound(String),

    /// A service exists under this name but holds a different type.
    #[error("service '{name}' is not a `{expected}`")]
    TypeMismatch { name: String, expected: &'static str },

    /// The request body is not valid JSON for the requested type.
    #[error("invalid JSON body: {0}")]
    Decode(#[source] serde_json::Error),

    /// A response body could not be serialised.
    #[error("failed to encode response body: {0}")]
    Encode(#[source] serde_json::Error),

    /// Reading the request body from the transport failed.
    #[error("failed to read request body: {0}")]
    Body(#[source] hyper::Error),

    /// `Server::bind` was given something that is not `host:port`.
    #[error("invalid socket address `{0}`")]
    Addr(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// A structured HTTP error with `code` and `message`.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self::Http { code, message: message.into(), source: None }
    }

    /// A structured HTTP error that keeps `cause` as its source.
    pub fn wrap(code: u16, message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::Http { code, message: message.into(), source: Some(cause.into()) }
    }

    pub fn bad_request() -> Self { Self::new(400, "Bad Request") }
    pub fn unauthorized() -> Self { Self::new(401, "Unauthorized") }
    pub fn forbidden() -> Self { Self::new(403, "Forbidden") }
    pub fn not_found() -> Self { Self::new(404, "Not Found") }
    pub fn internal() -> Self { Self::new(500, "Internal Server Error") }

    /// `400` with every issue joined into one readable message.
    pub fn validation(issues: &[Issue]) -> Self {
        Self::new(400, validation_message(issues))
    }

    /// Returns `(code, message)` when this is a structured HTTP error.
    pub fn http_status(&self) -> Option<(u16, &str)> {
        match self {
            Self::Http { code, message, .. } => Some((*code, message.as_str())),
            _ => None,
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }
}

pub(crate) fn validation_message(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return "Validation failed".to_owned();
    }
    let joined = issues.iter().map(Issue::to_string).collect::<Vec<_>>().join("; ");
    format!("Validation errors: {joined}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_only_for_structured_errors() {
        assert_eq!(Error::new(418, "teapot").http_status(), Some((418, "teapot")));
        assert_eq!(Error::not_found().http_status(), Some((404, "Not Found")));
        assert!(Error::ServiceNotFound("db".into()).http_status().is_none());
        assert!(!Error::Addr("nope".into()).is_http());
    }

    #[test]
    fn wrapped_cause_is_the_source() {
        let io = std::io::Error::other("disk on fire");
        let err = Error::wrap(503, "storage unavailable", io);
        assert_eq!(err.to_string(), "storage unavailable");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn validation_joins_issues() {
        let issues = vec![Issue::new("name", "is required"), Issue::new("age", "must be positive")];
        assert_eq!(
            Error::validation(&issues).http_status(),
            Some((400, "Validation errors: name: is required; age: must be positive"))
        );
        assert_eq!(Error::validation(&[]).to_string(), "Validation failed");
    }
}
