//! # lumora
//!
//! A small HTTP application layer: routing, composable middleware, a
//! per-request [`Context`], and a two-tier service registry.
//!
//! ## The model
//!
//! Handlers take a [`Context`] and return a [`Response`] value (or an
//! [`Error`]). Middleware wraps handlers; global middleware wraps route
//! middleware, which wraps the handler. The dispatcher sends whatever comes
//! out of the chain exactly once. An error nobody translated becomes a
//! generic `500`.
//!
//! Services live in an app-level [`Services`] registry. Route middleware can
//! lay request-scoped overrides over it with
//! [`use_services`](middleware::use_services); handlers resolve through
//! [`Context::service`], which checks the scoped tier first.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use lumora::{App, Context, Error, Response};
//! use lumora::middleware::{cors, error_handler, logging, use_service, CorsOptions};
//! use serde_json::json;
//!
//! struct Greeter(&'static str);
//!
//! async fn hello(ctx: Context) -> Result<Response, Error> {
//!     let greeter = ctx.service_as::<Greeter>("greeter")?;
//!     let name = ctx.param("name");
//!     Ok(Response::new().with_body(json!({ "message": format!("{} {name}", greeter.0) })))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let app = App::new()
//!         .middleware(cors(CorsOptions::default()))
//!         .middleware(logging())
//!         .middleware(error_handler())
//!         .get("/hello/:name", hello, &[])
//!         .get("/hola/:name", hello, &[use_service("greeter", Greeter("Hola"))]);
//!     app.services().register("greeter", Greeter("Hello"));
//!
//!     app.start("0.0.0.0:8080").await
//! }
//! ```

mod app;
mod context;
mod dispatch;
mod error;
mod handler;
mod method;
mod response;
mod router;
mod server;
mod services;
mod validate;

pub mod middleware;

pub use app::{App, Service};
pub use context::{Context, Value};
pub use dispatch::handle_response;
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, BoxedHandler, Handler, IntoOutcome, Outcome};
pub use method::Method;
pub use response::{Body, Cookie, IntoBody, Json, JsonBody, Response, SameSite};
pub use server::Server;
pub use services::{ServiceRef, Services, service};
pub use validate::{Issue, Issues, Validate};

#[doc(hidden)]
pub use handler::ErasedHandler;
