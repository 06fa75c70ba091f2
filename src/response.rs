//! Outgoing response model.
//!
//! A [`Response`] is a plain value: status, headers, cookies and a body.
//! Handlers build one, return it, and the dispatcher [sends](Response::send)
//! it exactly once. Nothing is serialised until then.
//!
//! ```rust
//! use lumora::{Cookie, Response};
//! use serde_json::json;
//!
//! Response::new()
//!     .with_status(201)
//!     .with_header("Location", "/users/42")
//!     .with_cookie(Cookie::new("session", "abc123").path("/").http_only(true))
//!     .with_body(json!({ "id": "42" }));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};

use serde::Serialize;
use tracing::warn;

use crate::context::Context;
use crate::error::Error;

// ── Cookie ────────────────────────────────────────────────────────────────────

/// The `SameSite` attribute of a cookie. `Default` omits the attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SameSite {
    #[default]
    Default,
    Lax,
    Strict,
    None,
}

/// A cookie written as one `Set-Cookie` header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: String,
    /// `> 0` sends `Max-Age=n`, `< 0` expires the cookie now, `0` omits it.
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), ..Self::default() }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = seconds;
        self
    }

    pub fn secure(mut self, on: bool) -> Self {
        self.secure = on;
        self
    }

    pub fn http_only(mut self, on: bool) -> Self {
        self.http_only = on;
        self
    }

    pub fn same_site(mut self, policy: SameSite) -> Self {
        self.same_site = policy;
        self
    }
}

/// Renders the `Set-Cookie` header value.
///
/// Bytes that would break out of their attribute (`;`, control characters)
/// are dropped. A name that is not a valid token renders as the empty
/// string, and [`Response::send`] skips it.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !is_token(&self.name) {
            return Ok(());
        }
        let value: String = self.value.chars().filter(|&c| is_cookie_value_char(c)).collect();
        if value.contains([' ', ',']) {
            write!(f, "{}=\"{}\"", self.name, value)?;
        } else {
            write!(f, "{}={}", self.name, value)?;
        }
        let path: String = self.path.chars().filter(|&c| is_cookie_path_char(c)).collect();
        if !path.is_empty() {
            write!(f, "; Path={path}")?;
        }
        let domain = self.domain.trim_start_matches('.');
        if is_domain(domain) {
            write!(f, "; Domain={domain}")?;
        }
        match self.max_age {
            0 => {}
            n if n < 0 => f.write_str("; Max-Age=0")?,
            n => write!(f, "; Max-Age={n}")?,
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        match self.same_site {
            SameSite::Default => {}
            SameSite::Lax => f.write_str("; SameSite=Lax")?,
            SameSite::Strict => f.write_str("; SameSite=Strict")?,
            SameSite::None => f.write_str("; SameSite=None")?,
        }
        Ok(())
    }
}

// RFC 7230 `token`.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}

// RFC 6265 `cookie-octet`, plus space and comma, which force quoting.
fn is_cookie_value_char(c: char) -> bool {
    (' '..='~').contains(&c) && !matches!(c, '"' | ';' | '\\')
}

fn is_cookie_path_char(c: char) -> bool {
    (' '..='~').contains(&c) && c != ';'
}

fn is_domain(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 255
        && !s.starts_with('-')
        && !s.contains("..")
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// Serialisation deferred until the response is sent.
pub trait JsonBody: Send + Sync {
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + Send + Sync> JsonBody for T {
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// What a response carries. The variant decides the inferred content type.
#[derive(Default)]
pub enum Body {
    /// No body; only the status line is written.
    #[default]
    Empty,
    /// Sent raw as `text/plain`.
    Text(String),
    /// Encoded on send as `application/json`.
    Json(Box<dyn JsonBody>),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Json(_) => f.write_str("Json(..)"),
        }
    }
}

/// Wraps any serialisable value as a JSON body.
///
/// Strings and maps already convert on their own; use `Json` for your own
/// `Serialize` types: `.with_body(Json(user))`.
pub struct Json<T>(pub T);

/// Conversion into a response [`Body`].
pub trait IntoBody {
    fn into_body(self) -> Body;
}

impl IntoBody for Body {
    fn into_body(self) -> Body { self }
}

impl IntoBody for () {
    fn into_body(self) -> Body { Body::Empty }
}

impl IntoBody for String {
    fn into_body(self) -> Body { Body::Text(self) }
}

impl IntoBody for &str {
    fn into_body(self) -> Body { Body::Text(self.to_owned()) }
}

impl IntoBody for serde_json::Value {
    fn into_body(self) -> Body { Body::Json(Box::new(self)) }
}

impl<T: Serialize + Send + Sync + 'static> IntoBody for Json<T> {
    fn into_body(self) -> Body { Body::Json(Box::new(self.0)) }
}

impl<K, V, S> IntoBody for HashMap<K, V, S>
where
    K: Serialize + Eq + Hash + Send + Sync + 'static,
    V: Serialize + Send + Sync + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    fn into_body(self) -> Body { Body::Json(Box::new(self)) }
}

impl<K, V> IntoBody for BTreeMap<K, V>
where
    K: Serialize + Send + Sync + 'static,
    V: Serialize + Send + Sync + 'static,
{
    fn into_body(self) -> Body { Body::Json(Box::new(self)) }
}

impl<T: Serialize + Send + Sync + 'static> IntoBody for Vec<T> {
    fn into_body(self) -> Body { Body::Json(Box::new(self)) }
}

impl<B: IntoBody> IntoBody for Option<B> {
    fn into_body(self) -> Body {
        self.map_or(Body::Empty, IntoBody::into_body)
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response. Defaults to `200` with no body.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    body: Body,
}

impl Default for Response {
    fn default() -> Self {
        Self { status: 200, headers: Vec::new(), cookies: Vec::new(), body: Body::Empty }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// `code` with body `{"error": message}`.
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        let mut body = BTreeMap::new();
        body.insert("error", message.into());
        Self::new().with_status(code).with_body(body)
    }

    /// The wire form of an error: a structured error keeps its code and
    /// message, anything else becomes `500 Internal Server Error`.
    pub fn from_error(err: &Error) -> Self {
        match err.http_status() {
            Some((code, message)) => Self::error(code, message),
            None => Self::error(500, "Internal Server Error"),
        }
    }

    pub fn with_status(mut self, code: u16) -> Self {
        self.status = code;
        self
    }

    /// Sets a header. Names compare case-insensitively; the last write wins.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(slot) => *slot = (name, value),
            None => self.headers.push((name, value)),
        }
        self
    }

    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn with_body(mut self, body: impl IntoBody) -> Self {
        self.body = body.into_body();
        self
    }

    pub fn status(&self) -> u16 { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn cookies(&self) -> &[Cookie] { &self.cookies }
    pub fn body(&self) -> &Body { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Writes the response through `ctx`.
    ///
    /// Headers and cookies always go out before the status is committed;
    /// a committed status freezes the header set.
    pub fn send(self, ctx: &Context) -> Result<(), Error> {
        for (name, value) in &self.headers {
            ctx.set_header(name, value);
        }
        for cookie in &self.cookies {
            let rendered = cookie.to_string();
            if rendered.is_empty() {
                warn!(cookie = cookie.name, "invalid cookie name, cookie dropped");
                continue;
            }
            ctx.add_header("set-cookie", &rendered);
        }

        let has_content_type = self.header("content-type").is_some();
        match self.body {
            Body::Empty => {
                ctx.status(self.status);
            }
            Body::Text(text) => {
                if !has_content_type {
                    ctx.set_header("content-type", "text/plain");
                }
                ctx.status(self.status);
                ctx.write(text.as_bytes());
            }
            Body::Json(value) => {
                // Encode before committing so a failure can still become a 500.
                let bytes = value.to_json().map_err(Error::Encode)?;
                if !has_content_type {
                    ctx.set_header("content-type", "application/json");
                }
                ctx.status(self.status);
                ctx.write(&bytes);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_last_write_wins_case_insensitively() {
        let resp = Response::new()
            .with_header("X-Trace", "one")
            .with_header("x-trace", "two");
        assert_eq!(resp.headers().len(), 1);
        assert_eq!(resp.header("X-TRACE"), Some("two"));
    }

    #[test]
    fn builder_order_does_not_matter() {
        let resp = Response::new().with_status(404).with_header("x-late", "yes");
        assert_eq!(resp.status(), 404);
        assert_eq!(resp.header("x-late"), Some("yes"));
    }

    #[test]
    fn body_variants_follow_the_value() {
        assert!(Response::new().body().is_empty());
        assert!(matches!(Response::new().with_body("hi").body(), Body::Text(s) if s == "hi"));
        let map: HashMap<&str, &str> = [("k", "v")].into();
        assert!(matches!(Response::new().with_body(map).body(), Body::Json(_)));
        assert!(Response::new().with_body(None::<String>).body().is_empty());
    }

    #[test]
    fn cookie_renders_set_cookie_value() {
        let cookie = Cookie::new("session", "abc123")
            .path("/")
            .domain(".example.com")
            .max_age(3600)
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Lax);
        assert_eq!(
            cookie.to_string(),
            "session=abc123; Path=/; Domain=example.com; Max-Age=3600; HttpOnly; Secure; SameSite=Lax"
        );
    }

    #[test]
    fn negative_max_age_expires_now() {
        assert_eq!(Cookie::new("a", "b").max_age(-1).to_string(), "a=b; Max-Age=0");
        assert_eq!(Cookie::new("a", "b c").to_string(), "a=\"b c\"");
    }

    #[test]
    fn attribute_breakouts_are_stripped() {
        let cookie = Cookie::new("session", "abc; Domain=evil.com")
            .path("/app;HttpOnly\r\n")
            .domain("ex;ample.com");
        assert_eq!(cookie.to_string(), "session=\"abc Domain=evil.com\"; Path=/appHttpOnly");
        assert_eq!(Cookie::new("id", "a\"b\\c\nd").to_string(), "id=abcd");
    }

    #[test]
    fn invalid_name_renders_nothing() {
        assert_eq!(Cookie::new("bad;name", "v").to_string(), "");
        assert_eq!(Cookie::new("line\nbreak", "v").to_string(), "");
        assert_eq!(Cookie::new("", "v").to_string(), "");
    }
}
