//! Error translation.
//!
//! Without this middleware an error escaping the chain reaches the adapter,
//! which can only answer with a generic `500`. With it, structured errors
//! keep their status and message.

use std::sync::Arc;

use tracing::{error, warn};

use crate::context::Context;
use crate::error::Error;
use crate::handler::Outcome;
use crate::response::Response;

use super::Middleware;

/// Custom translation from a downstream error to an outcome.
pub type ErrorFn = Arc<dyn Fn(&Context, Error) -> Outcome + Send + Sync>;

/// Knobs for [`error_handler_with`].
#[derive(Clone)]
pub struct ErrorHandlerOptions {
    /// Replaces the default translation when set.
    pub handler: Option<ErrorFn>,
    pub log_errors: bool,
}

impl Default for ErrorHandlerOptions {
    fn default() -> Self {
        Self { handler: None, log_errors: true }
    }
}

impl std::fmt::Debug for ErrorHandlerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandlerOptions")
            .field("handler", &self.handler.as_ref().map(|_| ".."))
            .field("log_errors", &self.log_errors)
            .finish()
    }
}

/// [`error_handler_with`] using the default options.
pub fn error_handler() -> Middleware {
    error_handler_with(ErrorHandlerOptions::default())
}

/// Turns every downstream error into a response.
///
/// The default translation answers a structured error with its own code and
/// `{"error": message}`, and anything else with
/// `500 {"error":"Internal Server Error"}`.
pub fn error_handler_with(options: ErrorHandlerOptions) -> Middleware {
    let options = Arc::new(options);
    Middleware::from_fn(move |ctx: Context, next| {
        let options = Arc::clone(&options);
        async move {
            let err = match next.run(ctx.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            if options.log_errors {
                log(&ctx, &err);
            }
            match &options.handler {
                Some(custom) => custom(&ctx, err),
                None => Ok(Some(Response::from_error(&err))),
            }
        }
    })
}

fn log(ctx: &Context, err: &Error) {
    match err.http_status() {
        Some((code, _)) if code < 500 => {
            warn!(method = %ctx.method(), path = ctx.path(), status = code, error = %err, "request error");
        }
        _ => {
            error!(method = %ctx.method(), path = ctx.path(), error = %err, "request error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::middleware::apply;
    use crate::response::Body;

    fn json_of(resp: &Response) -> Vec<u8> {
        match resp.body() {
            Body::Json(value) => value.to_json().unwrap(),
            other => panic!("expected a JSON body, got {other:?}"),
        }
    }

    async fn run(handler_err: Error, options: ErrorHandlerOptions) -> Response {
        let err = Arc::new(std::sync::Mutex::new(Some(handler_err)));
        let handler = apply(
            move |_ctx: Context| {
                let err = err.lock().unwrap().take().unwrap();
                async move { Err::<Response, _>(err) }
            },
            &[error_handler_with(options)],
        );
        handler.call(test_context("GET", "/", "")).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn structured_error_keeps_code_and_message() {
        let resp = run(Error::new(404, "User not found"), ErrorHandlerOptions::default()).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(json_of(&resp), br#"{"error":"User not found"}"#);
    }

    #[tokio::test]
    async fn other_errors_become_generic_500() {
        let resp = run(Error::ServiceNotFound("db".into()), ErrorHandlerOptions::default()).await;
        assert_eq!(resp.status(), 500);
        assert_eq!(json_of(&resp), br#"{"error":"Internal Server Error"}"#);
    }

    #[tokio::test]
    async fn custom_handler_replaces_default() {
        let options = ErrorHandlerOptions {
            handler: Some(Arc::new(|_ctx: &Context, err: Error| -> Outcome {
                Ok(Some(Response::new().with_status(503).with_body(err.to_string())))
            })),
            log_errors: false,
        };
        let resp = run(Error::internal(), options).await;
        assert_eq!(resp.status(), 503);
    }

    #[test]
    fn from_error_shape() {
        assert_eq!(Response::from_error(&Error::bad_request()).status(), 400);
        assert_eq!(Response::from_error(&Error::Addr("x".into())).status(), 500);
    }
}
