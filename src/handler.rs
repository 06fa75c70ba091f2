//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! Routes hold handlers of *different* concrete types, and middleware wraps
//! them in further types still. Everything is stored uniformly behind
//! `dyn ErasedHandler`:
//!
//! ```text
//! async fn get_user(ctx: Context) -> Result<Response, Error> { … }
//!        ↓ app.get("/users/:id", get_user, &[])
//! get_user.into_boxed_handler()                  ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_user))                  ← stored as BoxedHandler
//!        ↓ middleware wraps it in more BoxedHandlers
//! handler.call(ctx)  at request time             ← one vtable call per layer
//!        ↓
//! Box::pin(async { get_user(ctx).await.into_outcome() })
//! ```
//!
//! # What a handler returns
//!
//! Every handler resolves to an [`Outcome`]: a [`Response`] for the
//! dispatcher to send, nothing (the handler already wrote through the
//! context), or an [`Error`] for an outer middleware to translate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::response::Response;

/// The result of running a handler or a middleware chain.
///
/// - `Ok(Some(response))`: send `response`.
/// - `Ok(None)`: the handler wrote to the context directly.
/// - `Err(error)`: propagate outward for an error handler.
pub type Outcome = Result<Option<Response>, Error>;

/// A heap-allocated, type-erased future resolving to an [`Outcome`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// public `BoxedHandler` alias that middleware authors pass around.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── IntoOutcome ───────────────────────────────────────────────────────────────

/// Conversion from a handler's return value into an [`Outcome`].
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for Response {
    fn into_outcome(self) -> Outcome { Ok(Some(self)) }
}

impl IntoOutcome for Option<Response> {
    fn into_outcome(self) -> Outcome { Ok(self) }
}

/// The handler wrote through the context; nothing left to send.
impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome { Ok(None) }
}

impl<E: Into<Error>> IntoOutcome for Result<Response, E> {
    fn into_outcome(self) -> Outcome {
        self.map(Some).map_err(Into::into)
    }
}

impl<E: Into<Error>> IntoOutcome for Result<Option<Response>, E> {
    fn into_outcome(self) -> Outcome {
        self.map_err(Into::into)
    }
}

impl<E: Into<Error>> IntoOutcome for Result<(), E> {
    fn into_outcome(self) -> Outcome {
        self.map(|()| None).map_err(Into::into)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any
/// `async fn(Context) -> impl IntoOutcome`.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;

    async fn created(_ctx: Context) -> Response {
        Response::new().with_status(201)
    }

    async fn failing(_ctx: Context) -> Result<Response, Error> {
        Err(Error::not_found())
    }

    async fn writes_directly(ctx: Context) -> Result<(), Error> {
        ctx.text(200, "direct");
        Ok(())
    }

    #[tokio::test]
    async fn return_shapes_map_to_outcomes() {
        let ok = created.into_boxed_handler().call(test_context("GET", "/", "")).await;
        assert_eq!(ok.unwrap().map(|r| r.status()), Some(201));

        let err = failing.into_boxed_handler().call(test_context("GET", "/", "")).await;
        assert_eq!(err.unwrap_err().http_status(), Some((404, "Not Found")));

        let ctx = test_context("GET", "/", "");
        let none = writes_directly.into_boxed_handler().call(ctx.clone()).await;
        assert!(none.unwrap().is_none());
        assert_eq!(ctx.status_code(), Some(200));
    }
}
