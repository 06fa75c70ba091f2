//! Application builder and the compiled request service.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;

use crate::context::Context;
use crate::dispatch;
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::{Middleware, apply_boxed};
use crate::response::Response;
use crate::router::Router;
use crate::server::Server;
use crate::services::Services;

/// The application: routes, global middleware and app-level services.
///
/// Registration methods consume and return `self` so they chain. Global
/// middleware is composed when the app is turned into a [`Service`], so it
/// wraps every route regardless of registration order, always ahead of the
/// route's own middleware.
///
/// ```rust,no_run
/// use lumora::{App, Context, Response};
/// use lumora::middleware::{cors, error_handler, logging, CorsOptions};
///
/// async fn hello(_ctx: Context) -> Response {
///     Response::new().with_body("hello")
/// }
///
/// # async fn run() -> Result<(), lumora::Error> {
/// App::new()
///     .middleware(cors(CorsOptions::default()))
///     .middleware(logging())
///     .middleware(error_handler())
///     .get("/", hello, &[])
///     .start("0.0.0.0:8080")
///     .await
/// # }
/// ```
pub struct App {
    services: Services,
    middlewares: Vec<Middleware>,
    router: Router<usize>,
    routes: Vec<Route>,
}

struct Route {
    handler: BoxedHandler,
    middlewares: Vec<Middleware>,
}

impl App {
    pub fn new() -> Self {
        Self {
            services: Services::new(),
            middlewares: Vec::new(),
            router: Router::new(),
            routes: Vec::new(),
        }
    }

    /// The app-level registry every request resolves services against.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Adds global middleware, applied in registration order.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Registers `handler` for `method` and `pattern`, wrapped in
    /// `middlewares` (inside the global ones).
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is invalid or conflicts with an existing route.
    pub fn handle(
        mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
        middlewares: &[Middleware],
    ) -> Self {
        self.router.insert(method, pattern, self.routes.len());
        self.routes.push(Route {
            handler: handler.into_boxed_handler(),
            middlewares: middlewares.to_vec(),
        });
        self
    }

    pub fn get(self, pattern: &str, handler: impl Handler, middlewares: &[Middleware]) -> Self {
        self.handle(Method::Get, pattern, handler, middlewares)
    }

    pub fn post(self, pattern: &str, handler: impl Handler, middlewares: &[Middleware]) -> Self {
        self.handle(Method::Post, pattern, handler, middlewares)
    }

    pub fn put(self, pattern: &str, handler: impl Handler, middlewares: &[Middleware]) -> Self {
        self.handle(Method::Put, pattern, handler, middlewares)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler, middlewares: &[Middleware]) -> Self {
        self.handle(Method::Delete, pattern, handler, middlewares)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler, middlewares: &[Middleware]) -> Self {
        self.handle(Method::Patch, pattern, handler, middlewares)
    }

    /// Composes every chain and freezes the routing table.
    pub fn into_service(self) -> Service {
        let handlers = self.routes
            .into_iter()
            .map(|route| {
                let chain: Vec<Middleware> = self.middlewares.iter()
                    .chain(&route.middlewares)
                    .cloned()
                    .collect();
                apply_boxed(route.handler, &chain)
            })
            .collect();
        let not_found = apply_boxed(not_found.into_boxed_handler(), &self.middlewares);

        Service {
            inner: Arc::new(Inner {
                router: self.router,
                handlers,
                not_found,
                services: self.services,
            }),
        }
    }

    /// Binds `addr` and serves until SIGTERM or Ctrl-C.
    pub async fn start(self, addr: &str) -> Result<(), Error> {
        Server::bind(addr)?.serve(self).await
    }
}

impl Default for App {
    fn default() -> Self { Self::new() }
}

/// Terminal handler for requests no route matched.
async fn not_found(_ctx: Context) -> Response {
    Response::error(404, "Not Found")
}

// ── Service ───────────────────────────────────────────────────────────────────

/// A compiled [`App`], shared by every connection.
///
/// [`call`](Service::call) runs one request through routing, the middleware
/// chain and the dispatcher, without any network involved.
#[derive(Clone)]
pub struct Service {
    inner: Arc<Inner>,
}

struct Inner {
    router: Router<usize>,
    handlers: Vec<BoxedHandler>,
    not_found: BoxedHandler,
    services: Services,
}

impl Service {
    pub async fn call(&self, request: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        self.call_from(request, None).await
    }

    pub(crate) async fn call_from(
        &self,
        request: http::Request<Bytes>,
        remote_addr: Option<SocketAddr>,
    ) -> http::Response<Full<Bytes>> {
        let route = Method::try_from(request.method())
            .ok()
            .and_then(|method| self.inner.router.lookup(method, request.uri().path()));
        let (handler, params) = match route {
            Some((&index, params)) => (Arc::clone(&self.inner.handlers[index]), params),
            None => (Arc::clone(&self.inner.not_found), HashMap::new()),
        };

        let ctx = Context::new(request, self.inner.services.clone())
            .with_route(params, remote_addr);

        // Dropping this future (client gone) cancels the request's token.
        let _cancel_on_drop = ctx.cancellation().clone().drop_guard();

        let outcome = handler.call(ctx.clone()).await;
        dispatch::finish(&ctx, outcome);
        dispatch::into_http(&ctx)
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }
}
