//! Route-scoped services.
//!
//! Wraps a route so that, for each request, a scoped registry is built from
//! the app-level entries with the route's own entries on top. Handlers keep
//! calling [`Context::service`]; on this route it finds the overrides first.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{Context, ScopedServices};
use crate::services::{ServiceRef, service};

use super::Middleware;

/// Publishes `overrides` as the route's scoped services.
///
/// ```rust,no_run
/// use lumora::{App, Context, Response, service};
/// use lumora::middleware::use_services;
///
/// struct UserStore;
///
/// async fn get_user(ctx: Context) -> Response {
///     let _users = ctx.must_service_as::<UserStore>("userService");
///     Response::new()
/// }
///
/// let app = App::new().get(
///     "/users/:id",
///     get_user,
///     &[use_services([("userService", service(UserStore))])],
/// );
/// ```
pub fn use_services<I, K>(overrides: I) -> Middleware
where
    I: IntoIterator<Item = (K, ServiceRef)>,
    K: Into<String>,
{
    let overrides: Arc<HashMap<String, ServiceRef>> =
        Arc::new(overrides.into_iter().map(|(k, v)| (k.into(), v)).collect());

    Middleware::from_fn(move |ctx: Context, next| {
        let overrides = Arc::clone(&overrides);
        async move {
            let mut scoped = ctx.app_services().all();
            scoped.extend(overrides.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
            ctx.insert_extension(ScopedServices(Arc::new(scoped)));
            next.run(ctx).await
        }
    })
}

/// [`use_services`] for a single entry.
pub fn use_service<T: Any + Send + Sync>(name: impl Into<String>, value: T) -> Middleware {
    use_services([(name.into(), service(value))])
}
