//! Decoding and validating the JSON request body before the handler runs.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::error::Error;
use crate::validate::{Issue, Validate};

use super::Middleware;

/// Typed slot holding the validated body.
struct BodySlot<T>(Arc<T>);

impl<T> Clone for BodySlot<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Decodes the body into `T`, validates it, and publishes it for
/// [`json_body`]. Any failure answers `400` without running the handler.
///
/// ```rust,no_run
/// use lumora::{App, Context, Response, Validate};
/// use lumora::middleware::{json_body, use_json_body};
///
/// #[derive(serde::Deserialize, serde::Serialize)]
/// struct NewUser { name: String }
/// impl Validate for NewUser {}
///
/// async fn create(ctx: Context) -> Response {
///     let user = json_body::<NewUser>(&ctx).expect("published by use_json_body");
///     Response::new().with_status(201).with_body(lumora::Json(user.name.clone()))
/// }
///
/// let app = App::new().post("/users", create, &[use_json_body::<NewUser>()]);
/// ```
pub fn use_json_body<T>() -> Middleware
where
    T: DeserializeOwned + Validate + Send + Sync + 'static,
{
    Middleware::from_fn(|ctx: Context, next| async move {
        let value = decode::<T>(&ctx)?;
        ctx.insert_extension(BodySlot(Arc::new(value)));
        next.run(ctx).await
    })
}

/// Like [`use_json_body`], but stores the value in the per-request bag
/// under `key`; read it back with `ctx.get_as::<T>(key)`.
pub fn use_json_body_with_key<T>(key: impl Into<String>) -> Middleware
where
    T: DeserializeOwned + Validate + Send + Sync + 'static,
{
    let key: Arc<str> = key.into().into();
    Middleware::from_fn(move |ctx: Context, next| {
        let key = Arc::clone(&key);
        async move {
            let value = decode::<T>(&ctx)?;
            ctx.set(key.as_ref(), value);
            next.run(ctx).await
        }
    })
}

/// The body published by [`use_json_body::<T>`](use_json_body).
pub fn json_body<T: Send + Sync + 'static>(ctx: &Context) -> Option<Arc<T>> {
    ctx.extension::<BodySlot<T>>().map(|slot| slot.0)
}

fn decode<T: DeserializeOwned + Validate>(ctx: &Context) -> Result<T, Error> {
    if ctx.body().is_empty() {
        return Err(Error::new(400, "Request body is empty"));
    }
    let value: T = serde_json::from_slice(ctx.body())
        .map_err(|e| Error::validation(&[Issue::new("", e.to_string())]))?;
    value.validate().map_err(|issues| Error::validation(&issues))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::context::test_context;
    use crate::middleware::apply;
    use crate::response::{Body, Response};
    use crate::validate::Issues;

    #[derive(Debug, Deserialize)]
    struct NewUser {
        name: String,
        email: String,
    }

    impl Validate for NewUser {
        fn validate(&self) -> Result<(), Vec<Issue>> {
            let mut issues = Issues::new();
            issues
                .check(self.name.len() >= 3, "name", "must be at least 3 characters")
                .check(self.email.contains('@'), "email", "must be an email address");
            issues.finish()
        }
    }

    async fn echo_name(ctx: Context) -> Response {
        let name = json_body::<NewUser>(&ctx).map(|u| u.name.clone()).unwrap_or_default();
        Response::new().with_body(name)
    }

    #[tokio::test]
    async fn valid_body_reaches_the_handler() {
        let handler = apply(echo_name, &[use_json_body::<NewUser>()]);
        let ctx = test_context("POST", "/users", r#"{"name":"Alice","email":"a@example.com"}"#);
        let resp = handler.call(ctx).await.unwrap().unwrap();
        assert!(matches!(resp.body(), Body::Text(name) if name == "Alice"));
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let handler = apply(echo_name, &[use_json_body::<NewUser>()]);
        let err = handler.call(test_context("POST", "/users", "")).await.unwrap_err();
        assert_eq!(err.http_status(), Some((400, "Request body is empty")));
    }

    #[tokio::test]
    async fn every_failed_rule_is_reported() {
        let handler = apply(echo_name, &[use_json_body::<NewUser>()]);
        let ctx = test_context("POST", "/users", r#"{"name":"Al","email":"nope"}"#);
        let err = handler.call(ctx).await.unwrap_err();
        assert_eq!(
            err.http_status(),
            Some((400, "Validation errors: name: must be at least 3 characters; email: must be an email address"))
        );
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let handler = apply(echo_name, &[use_json_body::<NewUser>()]);
        let err = handler.call(test_context("POST", "/users", "{oops")).await.unwrap_err();
        let (code, message) = err.http_status().unwrap();
        assert_eq!(code, 400);
        assert!(message.starts_with("Validation errors: "));
    }

    #[tokio::test]
    async fn custom_key_uses_the_bag() {
        let handler = apply(
            |ctx: Context| async move {
                let user = ctx.get_as::<NewUser>("payload").expect("stored under key");
                Response::new().with_body(user.email.clone())
            },
            &[use_json_body_with_key::<NewUser>("payload")],
        );
        let ctx = test_context("POST", "/users", r#"{"name":"Alice","email":"a@example.com"}"#);
        let resp = handler.call(ctx.clone()).await.unwrap().unwrap();
        assert!(matches!(resp.body(), Body::Text(email) if email == "a@example.com"));
        assert!(json_body::<NewUser>(&ctx).is_none());
    }
}
