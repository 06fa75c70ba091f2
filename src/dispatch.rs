//! From a chain's [`Outcome`] to bytes on the transport.

use bytes::Bytes;
use http_body_util::Full;
use tracing::error;

use crate::context::Context;
use crate::error::Error;
use crate::handler::Outcome;
use crate::response::Response;

/// Sends whatever the chain produced.
///
/// - An error is returned untouched; the caller decides what to answer.
/// - A response is serialised through `ctx`.
/// - `Ok(None)` writes nothing: the handler already used the context.
pub fn handle_response(ctx: &Context, outcome: Outcome) -> Result<(), Error> {
    match outcome? {
        Some(response) => response.send(ctx),
        None => Ok(()),
    }
}

/// Last resort for an error no middleware translated: a generic `500`.
///
/// If the status line is already committed nothing more can be said to the
/// client; the error is only logged.
pub(crate) fn fallback(ctx: &Context, err: &Error) {
    error!(method = %ctx.method(), path = ctx.path(), error = %err, "unhandled error");
    if ctx.status_code().is_some() {
        return;
    }
    let generic = Response::from_error(&Error::internal());
    if let Err(e) = generic.send(ctx) {
        error!(error = %e, "failed to send fallback response");
    }
}

/// Runs the orchestrator and falls back on error.
pub(crate) fn finish(ctx: &Context, outcome: Outcome) {
    if let Err(err) = handle_response(ctx, outcome) {
        fallback(ctx, &err);
    }
}

/// Drains the context's sink into a transport response. A handler that
/// wrote nothing at all gets an empty `200`.
pub(crate) fn into_http(ctx: &Context) -> http::Response<Full<Bytes>> {
    let sink = ctx.take_sink();
    let mut response = http::Response::new(Full::new(sink.body.freeze()));
    *response.status_mut() = sink.status.unwrap_or(http::StatusCode::OK);
    *response.headers_mut() = sink.headers;
    response
}

/// The generic `500` for failures before a context exists.
pub(crate) fn internal_error() -> http::Response<Full<Bytes>> {
    let body = Bytes::from_static(br#"{"error":"Internal Server Error"}"#);
    let mut response = http::Response::new(Full::new(body));
    *response.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}
