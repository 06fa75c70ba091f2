//! Path-pattern router.
//!
//! One radix tree per HTTP method. Patterns use `:name` segments; a path
//! only matches a pattern with the same segment count. A trailing slash is
//! ignored on both sides. Static segments take priority over parameters at
//! the same position. Captured values are percent-decoded.
//!
//! A parameter also matches an empty segment: `/a//b` matches `/a/:x/b`
//! with `x = ""`. The tree cannot express that, so paths containing `//`
//! that miss the tree are retried segment by segment.

use std::borrow::Cow;
use std::collections::HashMap;

use matchit::Router as MatchitRouter;

use crate::method::Method;

/// Maps `(method, path)` to a value and the captured path parameters.
pub(crate) struct Router<T> {
    trees: HashMap<Method, MatchitRouter<usize>>,
    patterns: HashMap<Method, Vec<Pattern>>,
    values: Vec<T>,
}

struct Pattern {
    segments: Vec<Segment>,
    index: usize,
}

enum Segment {
    Static(String),
    Param(String),
}

impl<T> Router<T> {
    pub(crate) fn new() -> Self {
        Self { trees: HashMap::new(), patterns: HashMap::new(), values: Vec::new() }
    }

    /// # Panics
    ///
    /// Panics if `pattern` is malformed or conflicts with an earlier route.
    pub(crate) fn insert(&mut self, method: Method, pattern: &str, value: T) {
        let index = self.values.len();
        self.trees
            .entry(method)
            .or_default()
            .insert(translate(pattern), index)
            .unwrap_or_else(|e| panic!("invalid route `{method} {pattern}`: {e}"));
        self.patterns
            .entry(method)
            .or_default()
            .push(Pattern { segments: parse(pattern), index });
        self.values.push(value);
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Option<(&T, HashMap<String, String>)> {
        let path = normalize(path);
        if let Some(matched) = self.trees.get(&method).and_then(|tree| tree.at(&path).ok()) {
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), decode(v)))
                .collect();
            return Some((&self.values[*matched.value], params));
        }
        if !path.contains("//") {
            return None;
        }

        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        let (pattern, params) = self.patterns.get(&method)?
            .iter()
            .filter_map(|pattern| pattern.bind(&parts).map(|params| (pattern, params)))
            .max_by_key(|(pattern, _)| pattern.precedence())?;
        Some((&self.values[pattern.index], params))
    }
}

impl Pattern {
    fn bind(&self, parts: &[&str]) -> Option<HashMap<String, String>> {
        if self.segments.len() != parts.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Param(name) => {
                    params.insert(name.clone(), decode(part));
                }
                Segment::Static(literal) if literal == part => {}
                Segment::Static(_) => return None,
            }
        }
        Some(params)
    }

    // Earlier static segments win, as in the tree.
    fn precedence(&self) -> Vec<bool> {
        self.segments.iter().map(|s| matches!(s, Segment::Static(_))).collect()
    }
}

fn parse(pattern: &str) -> Vec<Segment> {
    pattern.trim_matches('/')
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => Segment::Param(name.to_owned()),
            _ => Segment::Static(segment.to_owned()),
        })
        .collect()
}

/// Rewrites `/users/:id` into matchit's `/users/{id}`, escaping braces in
/// static segments.
fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    for segment in normalize(pattern).split('/').skip(1) {
        out.push('/');
        match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
            _ => out.push_str(&segment.replace('{', "{{").replace('}', "}}")),
        }
    }
    out
}

/// Ensures a leading slash and drops a trailing one (except for the root).
fn normalize(path: &str) -> Cow<'_, str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        Cow::Borrowed(trimmed)
    } else if trimmed.is_empty() && path.starts_with('/') {
        Cow::Borrowed("/")
    } else {
        Cow::Owned(format!("/{trimmed}"))
    }
}

/// Percent-decodes a captured value; invalid UTF-8 keeps the raw text.
fn decode(raw: &str) -> String {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router<&'static str> {
        let mut router = Router::new();
        router.insert(Method::Get, "/", "root");
        router.insert(Method::Get, "/users/:id", "user");
        router.insert(Method::Get, "/users/new", "new-user");
        router.insert(Method::Get, "/a/:x/b/:y", "pair");
        router.insert(Method::Get, "/a/:x/b", "single");
        router.insert(Method::Get, "/echo/:name", "echo");
        router.insert(Method::Post, "/users", "create");
        router
    }

    #[test]
    fn params_resolve_by_name() {
        let router = router();
        let (value, params) = router.lookup(Method::Get, "/a/1/b/2").unwrap();
        assert_eq!(*value, "pair");
        assert_eq!(params, HashMap::from([("x".to_owned(), "1".to_owned()), ("y".to_owned(), "2".to_owned())]));
    }

    #[test]
    fn segment_count_must_match() {
        let router = router();
        assert!(router.lookup(Method::Get, "/a/1/b/2/c").is_none());
        assert!(router.lookup(Method::Get, "/users/42/posts").is_none());
        assert!(router.lookup(Method::Get, "/users//42").is_none());
    }

    #[test]
    fn trailing_slash_and_method_handling() {
        let router = router();
        assert_eq!(*router.lookup(Method::Get, "/users/42/").unwrap().0, "user");
        assert_eq!(*router.lookup(Method::Get, "/").unwrap().0, "root");
        assert!(router.lookup(Method::Delete, "/users/42").is_none());
        assert_eq!(*router.lookup(Method::Post, "/users").unwrap().0, "create");
    }

    #[test]
    fn static_segment_beats_parameter() {
        let router = router();
        assert_eq!(*router.lookup(Method::Get, "/users/new").unwrap().0, "new-user");
        assert_eq!(*router.lookup(Method::Get, "/users/neo").unwrap().0, "user");
    }

    #[test]
    fn captured_values_are_percent_decoded() {
        let router = router();
        let (_, params) = router.lookup(Method::Get, "/echo/hello%20world").unwrap();
        assert_eq!(params["name"], "hello world");

        let (_, params) = router.lookup(Method::Get, "/echo/caf%C3%A9").unwrap();
        assert_eq!(params["name"], "café");

        // Not valid UTF-8 once decoded: the raw text is kept.
        let (_, params) = router.lookup(Method::Get, "/echo/%FF").unwrap();
        assert_eq!(params["name"], "%FF");
    }

    #[test]
    fn parameter_matches_an_empty_segment() {
        let router = router();
        let (value, params) = router.lookup(Method::Get, "/a//b").unwrap();
        assert_eq!(*value, "single");
        assert_eq!(params["x"], "");

        let (value, params) = router.lookup(Method::Get, "/a//b/2").unwrap();
        assert_eq!(*value, "pair");
        assert_eq!(params["x"], "");
        assert_eq!(params["y"], "2");
    }

    #[test]
    fn empty_segment_keeps_static_priority() {
        let mut router = Router::new();
        router.insert(Method::Get, "/users/:id/:tab/:x", "param");
        router.insert(Method::Get, "/users/new/:tab/:x", "static");
        assert_eq!(*router.lookup(Method::Get, "/users/new//x").unwrap().0, "static");
        assert_eq!(*router.lookup(Method::Get, "/users/old//x").unwrap().0, "param");
    }

    #[test]
    fn translate_rewrites_and_escapes() {
        assert_eq!(translate("/users/:id"), "/users/{id}");
        assert_eq!(translate("users/:id/"), "/users/{id}");
        assert_eq!(translate("/"), "/");
        assert_eq!(translate("/lit/{x}"), "/lit/{{x}}");
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_parameters_panic() {
        let mut router = Router::new();
        router.insert(Method::Get, "/users/:id", 1);
        router.insert(Method::Get, "/users/:name", 2);
    }
}
