//! Per-request context.
//!
//! A [`Context`] is the one view of an in-flight exchange that handlers and
//! middleware see, whatever transport produced it: request line, headers,
//! body, path parameters, a per-request value bag, typed extension slots,
//! the response sink, and a cancellation token.
//!
//! `Context` is a cheap handle. Clones and
//! [`with_cancellation`](Context::with_cancellation) derivations share all
//! mutable per-request state, so a value stored by an outer middleware is
//! visible to every later stage.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Extensions, Method, StatusCode, Uri};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Error;
use crate::services::{ServiceRef, Services, downcast};

/// A value in the per-request bag.
pub type Value = Arc<dyn Any + Send + Sync>;

/// The route-scoped registry published by [`use_services`](crate::middleware::use_services).
///
/// Frozen once built: resolution during the request never sees writes.
#[derive(Clone)]
pub(crate) struct ScopedServices(pub(crate) Arc<HashMap<String, ServiceRef>>);

/// The normalised view of one request/response exchange.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

struct Shared {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    params: HashMap<String, String>,
    services: Services,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    query_cache: HashMap<String, String>,
    values: HashMap<String, Value>,
    extensions: Extensions,
    sink: Sink,
}

/// Response side of the exchange, with net/http commit semantics.
#[derive(Default)]
pub(crate) struct Sink {
    pub(crate) status: Option<StatusCode>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: BytesMut,
}

impl Context {
    /// Builds a context from a transport request whose body is already read.
    pub fn new(request: http::Request<Bytes>, services: Services) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            shared: Arc::new(Shared {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
                remote_addr: None,
                params: HashMap::new(),
                services,
                state: Mutex::new(State::default()),
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Attaches router output and connection details. Only valid before the
    /// context is shared, which is how adapters use it.
    pub(crate) fn with_route(
        mut self,
        params: HashMap<String, String>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.params = params;
            shared.remote_addr = remote_addr;
        }
        self
    }

    // ── Request ──────────────────────────────────────────────────────────────

    pub fn method(&self) -> &Method { &self.shared.method }
    pub fn uri(&self) -> &Uri { &self.shared.uri }
    pub fn path(&self) -> &str { self.shared.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.shared.headers }
    pub fn body(&self) -> &Bytes { &self.shared.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.shared.remote_addr }

    /// A path parameter, or `""` when the route declares no such name.
    ///
    /// An absent parameter and a present-but-empty one look the same here;
    /// use [`param_opt`](Self::param_opt) when the difference matters.
    pub fn param(&self, name: &str) -> &str {
        self.param_opt(name).unwrap_or("")
    }

    pub fn param_opt(&self, name: &str) -> Option<&str> {
        self.shared.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.shared.params
    }

    /// First value of query parameter `name`, or `""`. Cached per request.
    pub fn query(&self, name: &str) -> String {
        let mut state = self.state();
        if let Some(hit) = state.query_cache.get(name) {
            return hit.clone();
        }
        let value = self.shared.uri.query()
            .and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.into_owned())
            })
            .unwrap_or_default();
        state.query_cache.insert(name.to_owned(), value.clone());
        value
    }

    /// First value of request header `name` (case-insensitive), or `""`.
    pub fn header(&self, name: &str) -> &str {
        self.shared.headers.get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Decodes the request body as JSON into `T`.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.shared.body).map_err(Error::Decode)
    }

    // ── Per-request bag ──────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state().values.get(key).cloned()
    }

    /// Looks up `key` and downcasts it; `None` if absent or of another type.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key)?.downcast::<T>().ok()
    }

    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.set_value(key, Arc::new(value));
    }

    pub fn set_value(&self, key: impl Into<String>, value: Value) {
        self.state().values.insert(key.into(), value);
    }

    /// Stores a typed slot; one value per type.
    pub fn insert_extension<T: Clone + Send + Sync + 'static>(&self, value: T) {
        self.state().extensions.insert(value);
    }

    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.state().extensions.get::<T>().cloned()
    }

    // ── Services ─────────────────────────────────────────────────────────────

    /// The app-level registry this request was dispatched with.
    pub fn app_services(&self) -> &Services {
        &self.shared.services
    }

    /// Resolves `name`: the route-scoped registry first, then the app's.
    pub fn service(&self, name: &str) -> Result<ServiceRef, Error> {
        if let Some(ScopedServices(scoped)) = self.extension::<ScopedServices>() {
            if let Some(found) = scoped.get(name) {
                return Ok(Arc::clone(found));
            }
        }
        self.shared.services.get(name)
    }

    /// [`service`](Self::service) plus a checked downcast to `T`.
    ///
    /// A scoped entry of the wrong type is a mismatch; it does not fall
    /// through to the app-level entry.
    pub fn service_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, Error> {
        downcast(name, self.service(name)?)
    }

    /// # Panics
    ///
    /// Panics if neither tier has `name`. Misconfiguration, not a runtime path.
    pub fn must_service(&self, name: &str) -> ServiceRef {
        self.service(name).unwrap_or_else(|e| panic!("{e}"))
    }

    /// # Panics
    ///
    /// Panics if `name` is missing in both tiers or is not a `T`.
    pub fn must_service_as<T: Any + Send + Sync>(&self, name: &str) -> Arc<T> {
        self.service_as(name).unwrap_or_else(|e| panic!("{e}"))
    }

    // ── Cancellation ─────────────────────────────────────────────────────────

    /// Cancelled when the client goes away. Long operations should watch it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// A context with `token` as its cancellation scope, sharing everything else.
    pub fn with_cancellation(&self, token: CancellationToken) -> Context {
        Context { shared: Arc::clone(&self.shared), cancel: token }
    }

    // ── Response sink ────────────────────────────────────────────────────────

    /// Sets a response header. Dropped once the status is committed.
    pub fn set_header(&self, name: &str, value: &str) {
        self.put_header(name, value, false);
    }

    /// Appends a response header, keeping earlier values (`Set-Cookie`).
    pub fn add_header(&self, name: &str, value: &str) {
        self.put_header(name, value, true);
    }

    /// Commits the status line. Headers set afterwards are discarded, so
    /// set them first. A second call is ignored.
    pub fn status(&self, code: u16) {
        let mut state = self.state();
        if let Some(committed) = state.sink.status {
            warn!(committed = committed.as_u16(), ignored = code, "status already committed");
            return;
        }
        let status = StatusCode::from_u16(code).unwrap_or_else(|_| {
            warn!(code, "invalid status code, sending 500");
            StatusCode::INTERNAL_SERVER_ERROR
        });
        state.sink.status = Some(status);
    }

    /// The committed status, if any.
    pub fn status_code(&self) -> Option<u16> {
        self.state().sink.status.map(|s| s.as_u16())
    }

    /// Appends to the response body, committing `200` if no status is set.
    pub fn write(&self, bytes: &[u8]) {
        let mut state = self.state();
        state.sink.status.get_or_insert(StatusCode::OK);
        state.sink.body.extend_from_slice(bytes);
    }

    /// Writes `value` as JSON with `code` directly to the sink.
    pub fn json<T: Serialize + ?Sized>(&self, code: u16, value: &T) -> Result<(), Error> {
        let bytes = serde_json::to_vec(value).map_err(Error::Encode)?;
        self.set_header("content-type", "application/json");
        self.status(code);
        self.write(&bytes);
        Ok(())
    }

    /// Writes `text` as `text/plain` with `code` directly to the sink.
    pub fn text(&self, code: u16, text: &str) {
        self.set_header("content-type", "text/plain");
        self.status(code);
        self.write(text.as_bytes());
    }

    fn put_header(&self, name: &str, value: &str, append: bool) {
        let mut state = self.state();
        if state.sink.status.is_some() {
            warn!(header = name, "status already committed, header dropped");
            return;
        }
        let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) else {
            warn!(header = name, "invalid header, dropped");
            return;
        };
        if append {
            state.sink.headers.append(name, value);
        } else {
            state.sink.headers.insert(name, value);
        }
    }

    /// Takes everything written so far, leaving the sink empty.
    pub(crate) fn take_sink(&self) -> Sink {
        std::mem::take(&mut self.state().sink)
    }

    // The lock is never held across an await; a poisoned guard only means a
    // handler panicked mid-request, and the request is gone with it.
    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.shared.method)
            .field("uri", &self.shared.uri)
            .field("params", &self.shared.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_context(method: &str, uri: &str, body: &str) -> Context {
    let request = http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", "token123")
        .body(Bytes::from(body.to_owned()))
        .expect("valid test request");
    Context::new(request, Services::new())
}
