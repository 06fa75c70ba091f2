//! Middleware composition.
//!
//! A [`Middleware`] turns a handler into another handler. Chains compose
//! outer-first: for `[m1, m2, m3]` around `h`, the pre-logic runs
//! `m1 → m2 → m3 → h` and the outcome unwinds `h → m3 → m2 → m1`, so the
//! first middleware registered sees the request first and the result last.
//!
//! Most middleware is written with [`Middleware::from_fn`]:
//!
//! ```rust
//! use lumora::middleware::Middleware;
//! use lumora::Response;
//!
//! let require_token = Middleware::from_fn(|ctx, next| async move {
//!     if ctx.header("authorization").is_empty() {
//!         // Short-circuit: nothing downstream runs.
//!         return Ok(Some(Response::error(401, "Unauthorized")));
//!     }
//!     next.run(ctx).await
//! });
//! ```
//!
//! Built-in middleware:
//! - [`cors`]: CORS headers and preflight answers
//! - [`logging`]: request start/finish events through `tracing`
//! - [`error_handler`]: turns downstream errors into JSON error responses
//! - [`use_services`]: route-scoped service overrides
//! - [`use_json_body`] / [`use_headers`]: decode and validate request data

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, Outcome};

mod cors;
mod error_handler;
mod headers;
mod json_body;
mod logging;
mod services;

pub use cors::{CorsOptions, cors};
pub use error_handler::{ErrorHandlerOptions, error_handler, error_handler_with};
pub use headers::{headers, use_headers, use_headers_with_key};
pub use json_body::{json_body, use_json_body, use_json_body_with_key};
pub use logging::{Logger, LoggingOptions, RequestEvent, RequestLog, TracingLogger, logging, logging_with};
pub use services::{use_service, use_services};

/// The rest of the chain, as seen from inside a middleware.
#[derive(Clone)]
pub struct Next(BoxedHandler);

impl Next {
    /// Runs everything downstream of the current middleware.
    pub fn run(&self, ctx: Context) -> BoxFuture {
        self.0.call(ctx)
    }
}

/// A function from handler to handler.
///
/// Cloning is cheap; the same middleware value can wrap many routes.
#[derive(Clone)]
pub struct Middleware {
    wrap: Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>,
}

impl Middleware {
    /// Wraps `f`, which receives the next handler and returns the wrapped one.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        Self { wrap: Arc::new(f) }
    }

    /// Builds a middleware from `async |ctx, next| -> Outcome`.
    ///
    /// Call `next.run(ctx)` to delegate; return without calling it to
    /// short-circuit.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |next: BoxedHandler| -> BoxedHandler {
            Arc::new(FromFn { f: Arc::clone(&f), next: Next(next) })
        })
    }

    /// Applies this middleware to `next`.
    pub fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (self.wrap)(next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

struct FromFn<F> {
    f: Arc<F>,
    next: Next,
}

impl<F, Fut> ErasedHandler for FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin((self.f)(ctx, self.next.clone()))
    }
}

/// Folds `middlewares` into one: `compose([m1, m2])` wraps like `m1(m2(h))`.
pub fn compose(middlewares: impl IntoIterator<Item = Middleware>) -> Middleware {
    let chain: Vec<Middleware> = middlewares.into_iter().collect();
    Middleware::new(move |next| {
        chain.iter().rev().fold(next, |inner, mw| mw.wrap(inner))
    })
}

/// Wraps `handler` in `middlewares`, the first one outermost.
pub fn apply(handler: impl Handler, middlewares: &[Middleware]) -> BoxedHandler {
    apply_boxed(handler.into_boxed_handler(), middlewares)
}

pub(crate) fn apply_boxed(handler: BoxedHandler, middlewares: &[Middleware]) -> BoxedHandler {
    middlewares.iter().rev().fold(handler, |inner, mw| mw.wrap(inner))
}
