//! Decoding and validating request headers before the handler runs.
//!
//! Header names are lowercased and only the first value of a repeated
//! header is kept, so a target type reads like:
//!
//! ```rust
//! #[derive(serde::Deserialize)]
//! struct AuthHeaders {
//!     authorization: String,
//!     #[serde(rename = "x-api-key", default)]
//!     api_key: Option<String>,
//! }
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::Error;
use crate::validate::{Issue, Validate};

use super::Middleware;

/// Typed slot holding the validated headers.
struct HeaderSlot<T>(Arc<T>);

impl<T> Clone for HeaderSlot<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Decodes the request headers into `T`, validates them, and publishes the
/// result for [`headers`]. Any failure answers `400`.
pub fn use_headers<T>() -> Middleware
where
    T: DeserializeOwned + Validate + Send + Sync + 'static,
{
    Middleware::from_fn(|ctx: Context, next| async move {
        let value = decode::<T>(&ctx)?;
        ctx.insert_extension(HeaderSlot(Arc::new(value)));
        next.run(ctx).await
    })
}

/// Like [`use_headers`], but stores the value in the per-request bag under `key`.
pub fn use_headers_with_key<T>(key: impl Into<String>) -> Middleware
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

/// The headers published by [`use_headers::<T>`](use_headers).
pub fn headers<T: Send + Sync + 'static>(ctx: &Context) -> Option<Arc<T>> {
    ctx.extension::<HeaderSlot<T>>().map(|slot| slot.0)
}

fn decode<T: DeserializeOwned + Validate>(ctx: &Context) -> Result<T, Error> {
    let mut fields = Map::new();
    for name in ctx.headers().keys() {
        // `HeaderName` is already lowercase; non-UTF-8 values are skipped.
        if let Some(value) = ctx.headers().get(name).and_then(|v| v.to_str().ok()) {
            fields.insert(name.as_str().to_owned(), Value::String(value.to_owned()));
        }
    }
    let value: T = serde_json::from_value(Value::Object(fields))
        .map_err(|e| Error::validation(&[Issue::new("", e.to_string())]))?;
    value.validate().map_err(|issues| Error::validation(&issues))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde::Deserialize;

    use super::*;
    use crate::middleware::apply;
    use crate::response::{Body, Response};
    use crate::services::Services;

    #[derive(Deserialize)]
    struct AuthHeaders {
        authorization: String,
        #[serde(rename = "x-api-key", default)]
        api_key: Option<String>,
    }

    impl Validate for AuthHeaders {
        fn validate(&self) -> Result<(), Vec<Issue>> {
            if self.authorization.is_empty() {
                return Err(vec![Issue::new("authorization", "must not be empty")]);
            }
            Ok(())
        }
    }

    fn request(headers: &[(&str, &str)]) -> Context {
        let mut builder = http::Request::builder().uri("/protected");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        Context::new(builder.body(Bytes::new()).unwrap(), Services::new())
    }

    async fn token(ctx: Context) -> Response {
        let auth = headers::<AuthHeaders>(&ctx).expect("published by use_headers");
        let key = auth.api_key.clone().unwrap_or_else(|| "-".to_owned());
        Response::new().with_body(format!("{}|{key}", auth.authorization))
    }

    #[tokio::test]
    async fn mixed_case_names_and_first_value_win() {
        let handler = apply(token, &[use_headers::<AuthHeaders>()]);
        let ctx = request(&[("Authorization", "token123"), ("X-Api-Key", "k1"), ("x-api-key", "k2")]);
        let resp = handler.call(ctx).await.unwrap().unwrap();
        assert!(matches!(resp.body(), Body::Text(s) if s == "token123|k1"));
    }

    #[tokio::test]
    async fn missing_required_header_is_400() {
        let handler = apply(token, &[use_headers::<AuthHeaders>()]);
        let err = handler.call(request(&[("x-api-key", "k1")])).await.unwrap_err();
        let (code, message) = err.http_status().unwrap();
        assert_eq!(code, 400);
        assert!(message.contains("authorization"), "{message}");
    }

    #[tokio::test]
    async fn rule_violation_is_400() {
        let handler = apply(token, &[use_headers::<AuthHeaders>()]);
        let err = handler.call(request(&[("authorization", "")])).await.unwrap_err();
        assert_eq!(err.http_status(), Some((400, "Validation errors: authorization: must not be empty")));
    }

    #[tokio::test]
    async fn custom_key_uses_the_bag() {
        let handler = apply(
            |ctx: Context| async move {
                let auth = ctx.get_as::<AuthHeaders>("auth").expect("stored under key");
                Response::new().with_body(auth.authorization.clone())
            },
            &[use_headers_with_key::<AuthHeaders>("auth")],
        );
        let resp = handler.call(request(&[("authorization", "t")])).await.unwrap().unwrap();
        assert!(matches!(resp.body(), Body::Text(s) if s == "t"));
    }
}
