//! Cross-origin resource sharing.

use std::sync::Arc;

use http::Method;

use crate::context::Context;
use crate::response::Response;

use super::Middleware;

/// What the CORS middleware advertises.
#[derive(Clone, Debug)]
pub struct CorsOptions {
    /// `["*"]` allows any origin; otherwise the request origin must match
    /// one entry exactly and is echoed back.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    /// Preflight cache lifetime in seconds; `0` omits the header.
    pub max_age: u32,
    pub allow_credentials: bool,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            allowed_headers: vec!["*".into()],
            exposed_headers: Vec::new(),
            max_age: 86_400,
            allow_credentials: false,
        }
    }
}

/// Adds CORS headers to every response and answers `OPTIONS` preflights
/// with `204` without running the rest of the chain.
pub fn cors(options: CorsOptions) -> Middleware {
    let options = Arc::new(options);
    Middleware::from_fn(move |ctx: Context, next| {
        let options = Arc::clone(&options);
        async move {
            apply_headers(&ctx, &options);
            if *ctx.method() == Method::OPTIONS {
                return Ok(Some(Response::new().with_status(204)));
            }
            next.run(ctx).await
        }
    })
}

fn apply_headers(ctx: &Context, options: &CorsOptions) {
    match options.allowed_origins.first().map(String::as_str) {
        Some("*") => ctx.set_header("access-control-allow-origin", "*"),
        Some(_) => {
            let origin = ctx.header("origin");
            if options.allowed_origins.iter().any(|o| o == origin) {
                ctx.set_header("access-control-allow-origin", origin);
                ctx.add_header("vary", "Origin");
            }
        }
        None => {}
    }
    if !options.allowed_methods.is_empty() {
        ctx.set_header("access-control-allow-methods", &options.allowed_methods.join(", "));
    }
    if !options.allowed_headers.is_empty() {
        ctx.set_header("access-control-allow-headers", &options.allowed_headers.join(", "));
    }
    if !options.exposed_headers.is_empty() {
        ctx.set_header("access-control-expose-headers", &options.exposed_headers.join(", "));
    }
    if options.max_age > 0 {
        ctx.set_header("access-control-max-age", &options.max_age.to_string());
    }
    if options.allow_credentials {
        ctx.set_header("access-control-allow-credentials", "true");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::middleware::apply;
    use crate::services::Services;

    fn request(method: &str, origin: &str) -> Context {
        let request = http::Request::builder()
            .method(method)
            .uri("/users")
            .header("origin", origin)
            .body(Bytes::new())
            .unwrap();
        Context::new(request, Services::new())
    }

    #[tokio::test]
    async fn preflight_short_circuits_with_204() {
        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let handler = apply(
            move |_ctx: Context| {
                flag.store(true, Ordering::SeqCst);
                async { Response::new() }
            },
            &[cors(CorsOptions::default())],
        );

        let ctx = request("OPTIONS", "https://app.example");
        let resp = handler.call(ctx.clone()).await.unwrap().unwrap();
        assert_eq!(resp.status(), 204);
        assert!(!reached.load(Ordering::SeqCst));

        let sink = ctx.take_sink();
        assert_eq!(sink.headers["access-control-allow-origin"], "*");
        assert_eq!(sink.headers["access-control-allow-methods"], "GET, POST, PUT, DELETE, PATCH, OPTIONS");
        assert_eq!(sink.headers["access-control-max-age"], "86400");
    }

    #[tokio::test]
    async fn listed_origin_is_echoed_and_others_are_not() {
        let options = CorsOptions {
            allowed_origins: vec!["https://app.example".into()],
            allow_credentials: true,
            exposed_headers: vec!["X-Request-Id".into()],
            ..CorsOptions::default()
        };
        let handler = apply(|_ctx: Context| async { Response::new() }, &[cors(options)]);

        let allowed = request("GET", "https://app.example");
        handler.call(allowed.clone()).await.unwrap();
        let sink = allowed.take_sink();
        assert_eq!(sink.headers["access-control-allow-origin"], "https://app.example");
        assert_eq!(sink.headers["access-control-allow-credentials"], "true");
        assert_eq!(sink.headers["access-control-expose-headers"], "X-Request-Id");

        let denied = request("GET", "https://evil.example");
        handler.call(denied.clone()).await.unwrap();
        assert!(!denied.take_sink().headers.contains_key("access-control-allow-origin"));
    }
}
